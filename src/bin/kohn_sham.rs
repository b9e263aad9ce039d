//! Minimizes the smooth exact penalty reformulation of the discretized 1D
//! Kohn-Sham energy over the Stiefel manifold.
//!
//! Usage: `kohn_sham [n] [p] [alpha]` (defaults: 1000 20 1.0).

use std::env;
use std::process::ExitCode;

use expen::kohn_sham::KohnSham;
use expen::nalgebra::DMatrix;
use expen::penalty::ExactPenalty;
use expen::stiefel::Stiefel;
use expen::Minimizer;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn parse_args() -> Result<(usize, usize, f64), String> {
    let args: Vec<String> = env::args().skip(1).collect();

    let n = match args.first() {
        Some(arg) => arg.parse().map_err(|_| format!("invalid n: {arg}"))?,
        None => 1000,
    };
    let p = match args.get(1) {
        Some(arg) => arg.parse().map_err(|_| format!("invalid p: {arg}"))?,
        None => 20,
    };
    let alpha = match args.get(2) {
        Some(arg) => arg.parse().map_err(|_| format!("invalid alpha: {arg}"))?,
        None => 1.0,
    };

    if p > n {
        return Err(format!("p = {p} must not exceed n = {n}"));
    }

    Ok((n, p, alpha))
}

fn main() -> ExitCode {
    let (n, p, alpha) = match parse_args() {
        Ok(params) => params,
        Err(error) => {
            eprintln!("usage: kohn_sham [n] [p] [alpha]: {error}");
            return ExitCode::from(2);
        }
    };

    println!("Kohn-Sham ExPen experiment: n = {n}, p = {p}, alpha = {alpha}");

    let stiefel = Stiefel::new(n, p);
    let mut rng = StdRng::seed_from_u64(0);
    let x0 = stiefel.random_point::<f64, _>(&mut rng);

    let h = ExactPenalty::new(KohnSham::new(n, p, alpha), &x0);
    println!("penalty coefficient beta = {:.6}", h.beta());

    let minimizer = Minimizer::builder(&h)
        .with_initial(x0.as_slice().to_vec())
        .with_gtol(1e-5)
        .with_max_iters(5000)
        .build();

    let report = minimizer.run();

    println!("status              = {:?}", report.status);
    println!("iterations          = {}", report.iterations);
    println!("evaluations         = {}", report.f_evals);
    println!("final value         = {:.9}", report.value);
    println!("final gradient norm = {:.3e}", report.grad_norm);

    let z = DMatrix::from_column_slice(n, p, report.x.as_slice());
    println!("constraint violation = {:.3e}", stiefel.feasibility(&z));

    // Energy of the polar projection of the result onto the manifold.
    let x = stiefel.nearest_point(&z);
    println!("energy at projected point = {:.9}", h.model().energy(&x));

    if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
