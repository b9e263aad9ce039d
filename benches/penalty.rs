use criterion::{criterion_group, criterion_main, Criterion};
use expen::kohn_sham::{KohnSham, Tridiagonal};
use expen::nalgebra::DVector;
use expen::penalty::ExactPenalty;
use expen::stiefel::Stiefel;
use expen::{Function, Gradient};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;

const N: usize = 1000;
const P: usize = 20;

fn setup() -> (ExactPenalty<KohnSham<f64>>, DVector<f64>) {
    let mut rng = StdRng::seed_from_u64(0);
    let stiefel = Stiefel::new(N, P);
    let x0 = stiefel.random_point::<f64, _>(&mut rng);

    let h = ExactPenalty::new(KohnSham::new(N, P, 1.0), &x0);
    let x = DVector::from_column_slice(x0.as_slice());
    (h, x)
}

fn penalty_value(c: &mut Criterion) {
    let (h, x) = setup();

    c.bench_function("penalty value 1000x20", |b| b.iter(|| h.apply(&x)));
}

fn penalty_gradient(c: &mut Criterion) {
    let (h, x) = setup();
    let mut grad = x.clone_owned();

    c.bench_function("penalty gradient 1000x20", |b| {
        b.iter(|| h.apply_grad(&x, &mut grad))
    });
}

fn tridiagonal_solve(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let factor = Tridiagonal::<f64>::laplacian_1d(N)
        .factorize()
        .expect("the Laplacian is positive definite");
    let rho = DVector::from_fn(N, |_, _| rng.sample::<f64, _>(StandardNormal));

    c.bench_function("tridiagonal solve 1000", |b| b.iter(|| factor.solve(&rho)));
}

criterion_group!(benches, penalty_value, penalty_gradient, tridiagonal_solve);
criterion_main!(benches);
