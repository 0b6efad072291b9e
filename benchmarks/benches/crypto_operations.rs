use campus_vote::crypto::{
    BallotCipher, FullSession, PasswordConfig, PasswordHasher, SecureSaltManager, TokenSigner,
};
use campus_vote::types::{PrincipalId, Role};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use uuid::Uuid;

fn bench_tokens(c: &mut Criterion) {
    let signer = TokenSigner::for_testing();
    let claims = FullSession {
        principal_id: PrincipalId::new("2021-00417"),
        role: Role::Voter,
        mfa: true,
    };

    let mut group = c.benchmark_group("escalation_tokens");
    group.warm_up_time(Duration::from_millis(100));

    group.bench_function("issue", |b| {
        b.iter(|| signer.issue(black_box(claims.clone())).unwrap())
    });

    let token = signer.issue(claims.clone()).unwrap().token;
    group.bench_function("verify", |b| {
        b.iter(|| signer.verify::<FullSession>(black_box(&token)).unwrap())
    });

    // Wrong purpose must cost the same signature check
    group.bench_function("verify_wrong_purpose", |b| {
        b.iter(|| {
            signer
                .verify::<campus_vote::crypto::BallotCast>(black_box(&token))
                .is_err()
        })
    });

    group.finish();
}

fn bench_ballot_cipher(c: &mut Criterion) {
    let cipher = BallotCipher::for_testing();
    let principal = PrincipalId::new("2021-00417");
    let election = Uuid::new_v4();

    let mut group = c.benchmark_group("ballot_cipher");
    group.warm_up_time(Duration::from_millis(100));

    for positions in [1usize, 8, 32] {
        let payload = format!(
            "{{{}}}",
            (0..positions)
                .map(|i| format!("\"position-{i}\":[\"candidate-{i}\"]"))
                .collect::<Vec<_>>()
                .join(",")
        );
        let payload = payload.into_bytes();

        group.bench_with_input(BenchmarkId::new("seal", positions), &payload, |b, payload| {
            b.iter(|| cipher.seal(&principal, &election, black_box(payload)).unwrap())
        });

        let sealed = cipher.seal(&principal, &election, &payload).unwrap();
        group.bench_with_input(BenchmarkId::new("open", positions), &sealed, |b, sealed| {
            b.iter(|| cipher.open(&principal, &election, black_box(sealed)).unwrap())
        });
    }

    group.finish();
}

fn bench_secrets(c: &mut Criterion) {
    let mut group = c.benchmark_group("secrets");
    group.warm_up_time(Duration::from_millis(100));

    let salts = SecureSaltManager::for_testing();
    let principal = PrincipalId::new("2021-00417");
    group.bench_function("otp_digest", |b| {
        b.iter(|| salts.digest_one_time_code(black_box(&principal), black_box("482913")))
    });

    // Production cost parameters
    let hasher = PasswordHasher::new(&PasswordConfig::default()).unwrap();
    let phc = hasher.hash("correct horse battery staple").unwrap();
    group.sample_size(10);
    group.bench_function("password_verify", |b| {
        b.iter(|| {
            hasher
                .verify(black_box("correct horse battery staple"), &phc)
                .unwrap()
        })
    });
    group.bench_function("password_verify_dummy", |b| {
        b.iter(|| hasher.verify_dummy(black_box("correct horse battery staple")))
    });

    group.finish();
}

criterion_group!(benches, bench_tokens, bench_ballot_cipher, bench_secrets);

criterion_main!(benches);
