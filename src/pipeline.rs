//! End-to-end estimation session.
//!
//! [`Estimator`] keeps the state that moves between stages:
//! declarations -> grid -> observations + model outputs -> model uncertainty
//! -> run -> subdivide -> (new points filled by the caller) -> run ...
//!
//! Every subdivision replaces the grid with the next generation. Model outputs
//! and uncertainties computed for the old grid are dropped with it.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::data::{ForwardModel, ModelPoint, ModelTable, NewPoint, Observation, ObservationSet};
use crate::domain::{InferenceConfig, ObservationConfig, SubdivideConfig};
use crate::error::BayesError;
use crate::fit::{
    InferenceInputs, ModelUncertainty, Pmf, RunSummary, estimate_model_uncertainty,
    run_inference, subdivide,
};
use crate::report::format_posterior_summary;
use crate::space::{Grid, ParameterSpace};

/// Relative slack when matching a supplied parameter tuple to a box center.
const CENTER_RTOL: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Estimator {
    space: ParameterSpace,
    grid: Grid,
    observations: Option<ObservationSet>,
    table: ModelTable,
    outputs: Option<DMatrix<f64>>,
    model_unc: Option<ModelUncertainty>,
    pmf: Pmf,
    /// Mass handed down by the last subdivision, not renormalized.
    carried: Option<Pmf>,
    runs: u64,
    last_run: Option<RunSummary>,
}

impl Estimator {
    /// Validate the declarations and build the generation-0 grid.
    pub fn new(space: ParameterSpace) -> Result<Self, BayesError> {
        let grid = space.build_grid()?;
        let table = ModelTable::new(space.conditions().len(), space.fit_params().len());
        let pmf = Pmf::uniform(&grid);
        Ok(Self {
            space,
            grid,
            observations: None,
            table,
            outputs: None,
            model_unc: None,
            pmf,
            carried: None,
            runs: 0,
            last_run: None,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Current distribution: the last posterior, or uniform before any run.
    pub fn pmf(&self) -> &Pmf {
        &self.pmf
    }

    pub fn carried(&self) -> Option<&Pmf> {
        self.carried.as_ref()
    }

    pub fn observations(&self) -> Option<&ObservationSet> {
        self.observations.as_ref()
    }

    pub fn model_table(&self) -> &ModelTable {
        &self.table
    }

    pub fn model_uncertainty(&self) -> Option<&ModelUncertainty> {
        self.model_unc.as_ref()
    }

    pub fn last_run(&self) -> Option<&RunSummary> {
        self.last_run.as_ref()
    }

    /// Replace the observation set. Returns the number of rows kept.
    pub fn attach_observations(
        &mut self,
        rows: Vec<Observation>,
        config: &ObservationConfig,
    ) -> Result<usize, BayesError> {
        let submitted = rows.len();
        let set = ObservationSet::new(&self.space, rows, config)?;
        info!(
            submitted,
            kept = set.len(),
            condition_tuples = set.conditions().len(),
            "attached observations"
        );
        let kept = set.len();
        self.table.retain_grid(&self.grid, set.conditions());
        self.observations = Some(set);
        self.invalidate_outputs();
        Ok(kept)
    }

    /// Merge externally computed model outputs into the table.
    ///
    /// Condition values are snapped to the matching observed tuple within the
    /// declared tolerances, and parameter values to the center of the box
    /// containing them when they agree to within rounding, so outputs written
    /// out and read back in land on the keys the grid looks up.
    pub fn attach_model_output(&mut self, points: Vec<ModelPoint>) -> Result<usize, BayesError> {
        let n = points.len();
        for mut point in points {
            if let Some(conditions) = self.observations.as_ref().map(|o| o.conditions()) {
                if let Some(tuple) = conditions
                    .find(&point.conditions)
                    .and_then(|c| conditions.get(c))
                {
                    point.conditions = tuple.to_vec();
                }
            }
            if let Some(center) = self.matching_center(&point.params) {
                point.params = center;
            }
            self.table.insert(point)?;
        }
        debug!(attached = n, table = self.table.len(), "attached model outputs");
        self.invalidate_outputs();
        Ok(n)
    }

    fn matching_center(&self, params: &[f64]) -> Option<Vec<f64>> {
        let id = self.grid.locate(params)?;
        let center = &self.grid.boxes()[id].center;
        let close = params
            .iter()
            .zip(center.iter())
            .all(|(&p, &c)| (p - c).abs() <= CENTER_RTOL * c.abs().max(1.0));
        close.then(|| center.clone())
    }

    /// Points of the current grid × observed conditions still lacking an output.
    pub fn new_points(&self) -> Result<Vec<NewPoint>, BayesError> {
        let obs = self.require_observations()?;
        Ok(self.table.missing_points(&self.grid, obs.conditions()))
    }

    /// Fill every missing point with `model`. Returns the number evaluated.
    pub fn evaluate_with<M>(&mut self, model: &M) -> Result<usize, BayesError>
    where
        M: ForwardModel + Sync + ?Sized,
    {
        let missing = self.new_points()?;
        let n = self.table.evaluate_points(model, &missing)?;
        if n > 0 {
            self.invalidate_outputs();
        }
        Ok(n)
    }

    /// Compute model uncertainty for the current grid.
    pub fn calc_model_unc(&mut self) -> Result<&ModelUncertainty, BayesError> {
        let obs = self.require_observations()?;
        let outputs = self.table.output_matrix(&self.grid, obs.conditions())?;
        let unc = estimate_model_uncertainty(&self.grid, &outputs)?;
        self.outputs = Some(outputs);
        let unc = self.model_unc.insert(unc);
        Ok(&*unc)
    }

    /// Run inference on the current grid and keep the posterior.
    pub fn run(&mut self, config: &InferenceConfig) -> Result<RunSummary, BayesError> {
        config.validate()?;
        if self.model_unc.is_none() || self.outputs.is_none() {
            self.calc_model_unc()?;
        }
        let prior = self.starting_prior(config.relaxation)?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.runs)),
            None => StdRng::from_entropy(),
        };

        let (Some(observations), Some(outputs), Some(model_unc)) =
            (&self.observations, &self.outputs, &self.model_unc)
        else {
            return Err(BayesError::data("Run inputs are not available."));
        };
        let inputs = InferenceInputs {
            grid: &self.grid,
            observations,
            outputs,
            model_unc,
        };
        let summary = run_inference(&inputs, &prior, config, &mut rng)?;

        self.runs += 1;
        self.pmf = summary.posterior.clone();
        self.carried = None;
        self.last_run = Some(summary.clone());
        Ok(summary)
    }

    /// Starting prior: uniform, mixed with the carried (or previous) posterior
    /// when `relaxation > 0`.
    fn starting_prior(&self, relaxation: f64) -> Result<Pmf, BayesError> {
        let uniform = Pmf::uniform(&self.grid);
        if relaxation <= 0.0 {
            return Ok(uniform);
        }
        let mut previous = match (&self.carried, self.runs) {
            (Some(carried), _) => carried.clone(),
            (None, 0) => return Ok(uniform),
            (None, _) => self.pmf.clone(),
        };
        previous.normalize()?;
        previous.mix(&uniform, relaxation)
    }

    /// Refine the grid around the current posterior.
    ///
    /// Returns the points the forward model must fill before the next run.
    pub fn subdivide(&mut self, config: &SubdivideConfig) -> Result<Vec<NewPoint>, BayesError> {
        let obs = self
            .observations
            .as_ref()
            .ok_or_else(|| BayesError::data("No observations attached."))?;
        // Carried mass from an earlier subdivision is compared as a distribution.
        let mut current = self.pmf.clone();
        current.normalize()?;
        let out = subdivide(&self.grid, &current, &self.table, obs.conditions(), config)?;

        self.table.retain_grid(&out.grid, obs.conditions());
        let carried = Pmf::from_probs(out.grid.generation(), out.carried)?;
        info!(
            generation = out.grid.generation(),
            carried_mass = carried.total(),
            table = self.table.len(),
            "moved to next grid generation"
        );
        self.grid = out.grid;
        self.pmf = carried.clone();
        self.carried = Some(carried);
        self.outputs = None;
        self.model_unc = None;
        Ok(out.new_points)
    }

    /// Text summary of the last run.
    pub fn summary(&self, top_n: usize) -> Result<String, BayesError> {
        let run = self
            .last_run
            .as_ref()
            .filter(|r| r.posterior.generation() == self.grid.generation())
            .ok_or_else(|| BayesError::data("No run on the current grid generation."))?;
        format_posterior_summary(&self.grid, run, top_n)
    }

    fn require_observations(&self) -> Result<&ObservationSet, BayesError> {
        self.observations
            .as_ref()
            .ok_or_else(|| BayesError::data("No observations attached."))
    }

    fn invalidate_outputs(&mut self) {
        self.outputs = None;
        self.model_unc = None;
    }
}
