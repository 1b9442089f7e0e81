//! Repeated partial-update cycles over shuffled observations.
//!
//! One run works like this:
//!
//! - shuffle every observation once
//! - start a cycle from the starting prior and apply observations one at a
//!   time until the posterior is concentrated (`th_pm` of the mass inside
//!   `th_pv` of the boxes) or the queue is empty
//! - snapshot the cycle's posterior and start the next cycle from the prior
//! - stop once `min_num_pts` observations have been consumed
//!
//! The returned posterior is the plain average of the snapshots. A cycle never
//! multiplies more likelihoods than it needs to concentrate.

use nalgebra::DMatrix;
use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::data::ObservationSet;
use crate::domain::InferenceConfig;
use crate::error::BayesError;
use crate::fit::pmf::Pmf;
use crate::fit::uncertainty::ModelUncertainty;
use crate::math::gaussian_density;
use crate::space::Grid;

/// Everything a run reads. All tables must describe the same grid.
#[derive(Debug, Clone, Copy)]
pub struct InferenceInputs<'a> {
    pub grid: &'a Grid,
    pub observations: &'a ObservationSet,
    /// Modeled outputs, `boxes × condition tuples`.
    pub outputs: &'a DMatrix<f64>,
    pub model_unc: &'a ModelUncertainty,
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub posterior: Pmf,
    pub cycles: usize,
    /// Cycles that stopped because the posterior concentrated.
    pub concentrated_cycles: usize,
    pub consumed: usize,
}

impl InferenceInputs<'_> {
    fn check(&self) -> Result<(), BayesError> {
        let n_boxes = self.grid.len();
        let n_cond = self.observations.conditions().len();
        if self.outputs.shape() != (n_boxes, n_cond) {
            return Err(BayesError::data(format!(
                "Output table is {:?}, expected ({n_boxes}, {n_cond}).",
                self.outputs.shape()
            )));
        }
        if self.model_unc.values().shape() != (n_boxes, n_cond) {
            return Err(BayesError::data(format!(
                "Model uncertainty table is {:?}, expected ({n_boxes}, {n_cond}).",
                self.model_unc.values().shape()
            )));
        }
        Ok(())
    }

    /// Per-box likelihood of observation `i`.
    ///
    /// The standard deviation is the experimental uncertainty plus the model
    /// uncertainty of the box at the observation's condition tuple.
    pub fn likelihoods(&self, i: usize) -> Vec<f64> {
        let obs = self.observations.row(i);
        let c = self.observations.condition_id(i);
        let exp_unc = self.observations.uncertainty(i);
        (0..self.grid.len())
            .into_par_iter()
            .map(|id| {
                let residual = obs.output - self.outputs[(id, c)];
                gaussian_density(residual, exp_unc + self.model_unc.get(id, c))
            })
            .collect()
    }
}

/// Run the cycle-and-average procedure starting every cycle from `prior`.
pub fn run_inference<R: Rng + ?Sized>(
    inputs: &InferenceInputs<'_>,
    prior: &Pmf,
    config: &InferenceConfig,
    rng: &mut R,
) -> Result<RunSummary, BayesError> {
    config.validate()?;
    inputs.check()?;
    if prior.len() != inputs.grid.len() {
        return Err(BayesError::data(format!(
            "Prior has {} boxes, grid has {}.",
            prior.len(),
            inputs.grid.len()
        )));
    }
    let n_obs = inputs.observations.len();
    if n_obs == 0 {
        return Err(BayesError::data("No observations attached."));
    }

    let budget = config.resolved_min_num_pts(n_obs);
    let mut queue: Vec<usize> = (0..n_obs).collect();
    queue.shuffle(rng);

    let mut snapshots = Vec::new();
    let mut concentrated_cycles = 0usize;
    let mut consumed = 0usize;

    while consumed < budget {
        if queue.is_empty() {
            break;
        }
        let mut current = prior.clone();
        let mut used = 0usize;
        let mut concentrated = false;

        while let Some(i) = queue.pop() {
            let likelihoods = inputs.likelihoods(i);
            current.bayesian_update(&likelihoods).map_err(|e| {
                e.for_observation(i, || describe_observation(inputs.observations, i))
            })?;
            used += 1;
            if current.is_concentrated(config.th_pm, config.th_pv) {
                concentrated = true;
                break;
            }
        }

        consumed += used;
        if concentrated {
            concentrated_cycles += 1;
        } else {
            warn!(
                used,
                concentration = current.concentration(config.th_pv),
                "observations ran out before the posterior concentrated"
            );
        }
        debug!(
            cycle = snapshots.len(),
            used,
            consumed,
            concentrated,
            "cycle finished"
        );
        snapshots.push(current);
    }

    let posterior = Pmf::average(&snapshots)?;
    info!(
        cycles = snapshots.len(),
        concentrated_cycles,
        consumed,
        budget,
        boxes = inputs.grid.len(),
        "inference run finished"
    );

    Ok(RunSummary {
        posterior,
        cycles: snapshots.len(),
        concentrated_cycles,
        consumed,
    })
}

fn describe_observation(observations: &ObservationSet, i: usize) -> String {
    let obs = observations.row(i);
    format!(
        "observation {i} at conditions {:?} (output {}, uncertainty {}) has zero likelihood on every box",
        obs.conditions,
        obs.output,
        observations.uncertainty(i)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ModelTable, Observation};
    use crate::domain::{ExperimentalCondition, FitParameter, ObservationConfig, OutputVariable};
    use crate::fit::uncertainty::estimate_model_uncertainty;
    use crate::space::ParameterSpace;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// y = a · x on a 1-D grid over a ∈ [0, 4].
    struct Fixture {
        grid: Grid,
        observations: ObservationSet,
        outputs: DMatrix<f64>,
        model_unc: ModelUncertainty,
    }

    impl Fixture {
        fn new(truth: f64, n_obs: usize, resolution: usize) -> Self {
            let mut space = ParameterSpace::new(OutputVariable::new("y"));
            space
                .add_fit_param(FitParameter::new("a", 0.0, 4.0).with_resolution(resolution))
                .unwrap();
            space.add_condition(ExperimentalCondition::new("x").as_x()).unwrap();
            let grid = space.build_grid().unwrap();

            let rows = (1..=n_obs)
                .map(|i| {
                    let x = i as f64 / n_obs as f64;
                    Observation::new(vec![x], truth * x)
                })
                .collect();
            let observations =
                ObservationSet::new(&space, rows, &ObservationConfig::fixed(0.05)).unwrap();

            let mut table = ModelTable::new(1, 1);
            let model = |c: &[f64], p: &[f64]| p[0] * c[0];
            let missing = table.missing_points(&grid, observations.conditions());
            table.evaluate_points(&model, &missing).unwrap();
            let outputs = table.output_matrix(&grid, observations.conditions()).unwrap();
            let model_unc = estimate_model_uncertainty(&grid, &outputs).unwrap();
            Self {
                grid,
                observations,
                outputs,
                model_unc,
            }
        }

        fn inputs(&self) -> InferenceInputs<'_> {
            InferenceInputs {
                grid: &self.grid,
                observations: &self.observations,
                outputs: &self.outputs,
                model_unc: &self.model_unc,
            }
        }
    }

    #[test]
    fn posterior_peaks_at_true_box() {
        let fx = Fixture::new(2.3, 30, 8);
        let prior = Pmf::uniform(&fx.grid);
        let mut rng = StdRng::seed_from_u64(11);
        let run = run_inference(&fx.inputs(), &prior, &InferenceConfig::default(), &mut rng)
            .unwrap();
        assert!(run.posterior.is_normalized());
        let best = run.posterior.argmax().unwrap();
        assert!(fx.grid.boxes()[best].contains(&[2.3]));
        assert!(run.consumed >= 21);
    }

    #[test]
    fn full_budget_consumes_every_observation() {
        let fx = Fixture::new(1.1, 12, 8);
        let prior = Pmf::uniform(&fx.grid);
        let cfg = InferenceConfig {
            min_num_pts: Some(12),
            ..InferenceConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let run = run_inference(&fx.inputs(), &prior, &cfg, &mut rng).unwrap();
        assert_eq!(run.consumed, 12);
        assert!(run.cycles >= 1);
    }

    #[test]
    fn unreachable_threshold_still_snapshots() {
        let fx = Fixture::new(1.1, 5, 8);
        let prior = Pmf::uniform(&fx.grid);
        // With 8 boxes, th_pv = 0.05 keeps a single box, and five points
        // cannot push all of the mass into it.
        let cfg = InferenceConfig {
            th_pm: 1.0,
            ..InferenceConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let run = run_inference(&fx.inputs(), &prior, &cfg, &mut rng).unwrap();
        assert_eq!(run.cycles, 1);
        assert_eq!(run.concentrated_cycles, 0);
        assert_eq!(run.consumed, 5);
        assert!(run.posterior.is_normalized());
    }

    #[test]
    fn inconsistent_observation_is_reported() {
        let mut fx = Fixture::new(1.0, 4, 4);
        let mut rows: Vec<Observation> = fx.observations.rows().to_vec();
        rows.push(Observation::new(vec![1.0], 1.0e6));
        let mut space = ParameterSpace::new(OutputVariable::new("y"));
        space
            .add_fit_param(FitParameter::new("a", 0.0, 4.0).with_resolution(4))
            .unwrap();
        space.add_condition(ExperimentalCondition::new("x")).unwrap();
        fx.observations = ObservationSet::new(&space, rows, &ObservationConfig::fixed(0.05)).unwrap();

        let prior = Pmf::uniform(&fx.grid);
        let cfg = InferenceConfig {
            min_num_pts: Some(5),
            th_pm: 1.0,
            ..InferenceConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let err = run_inference(&fx.inputs(), &prior, &cfg, &mut rng).unwrap_err();
        match err {
            BayesError::DegenerateUpdate { observation, detail } => {
                assert_eq!(observation, Some(4));
                assert!(detail.contains("observation 4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mismatched_prior_is_rejected() {
        let fx = Fixture::new(1.0, 4, 4);
        let other = Grid::initial(&[FitParameter::new("a", 0.0, 1.0).with_resolution(3)]).unwrap();
        let prior = Pmf::uniform(&other);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(run_inference(&fx.inputs(), &prior, &InferenceConfig::default(), &mut rng).is_err());
    }
}
