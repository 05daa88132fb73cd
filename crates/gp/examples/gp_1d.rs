use env_logger::{Builder, Env};
use gpbo_gp::kernels::SquaredExpArdKernel;
use gpbo_gp::mean_models::DataMean;
use gpbo_gp::{GaussianProcess, GpParams, HpTarget, HyperOptimization};
use gpbo_opt::RandomSource;
use linfa::ParamGuard;
use ndarray::{array, Array, Array1, Axis};
use std::sync::Arc;

fn xsinx(x: f64) -> f64 {
    (x - 3.5) * ((x - 3.5) / std::f64::consts::PI).sin()
}

fn main() {
    let env = Env::new().filter_or("GPBO_LOG", "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let rng = Arc::new(RandomSource::seed_from_u64(42));
    let params = GpParams::new(SquaredExpArdKernel::new(1), DataMean())
        .noise(1e-8)
        .hp_opt(HyperOptimization::rprop(HpTarget::Kernel, rng).restarts(5))
        .check()
        .expect("GP params");
    let mut gp = GaussianProcess::new(params);

    let xt = array![[0.], [7.], [25.]];
    let yt = xt.mapv(xsinx);
    gp.compute(&xt, &yt, &Array1::from_elem(xt.nrows(), 1e-8))
        .expect("GP computation");

    // sequentially add the points of highest variance
    let xplot = Array::linspace(0., 25., 101).insert_axis(Axis(1));
    for _ in 0..7 {
        let vars = gp.predict_var(&xplot).expect("GP variance prediction");
        let best = vars
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        let x = xplot.row(best.0);
        gp.add_sample(&x, &array![xsinx(x[0])], 1e-8)
            .expect("GP update");
        gp.optimize_hyperparams().expect("GP hyperparameters optimization");
    }
    println!("{gp}");

    for x in Array::linspace(0., 25., 11).iter() {
        let (mu, sigma) = gp.query(&array![*x]).expect("GP query");
        println!("x={x:5.1} y={:8.4} mu={:8.4} sigma={sigma:.2e}", xsinx(*x), mu[0]);
    }
}
