//! Problem declaration: fit parameters, experimental conditions, output.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{ExperimentalCondition, FitParameter, OutputVariable};
use crate::error::BayesError;
use crate::space::grid::Grid;

/// Owns every declaration of the problem and builds the initial grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    fit_params: Vec<FitParameter>,
    conditions: Vec<ExperimentalCondition>,
    output: OutputVariable,
}

impl ParameterSpace {
    pub fn new(output: OutputVariable) -> Self {
        Self {
            fit_params: Vec::new(),
            conditions: Vec::new(),
            output,
        }
    }

    pub fn add_fit_param(&mut self, param: FitParameter) -> Result<(), BayesError> {
        param.validate()?;
        self.ensure_unique(&param.name)?;
        self.fit_params.push(param);
        Ok(())
    }

    pub fn add_condition(&mut self, condition: ExperimentalCondition) -> Result<(), BayesError> {
        condition.validate()?;
        self.ensure_unique(&condition.name)?;
        if condition.is_x && self.conditions.iter().any(|c| c.is_x) {
            return Err(BayesError::config(format!(
                "Condition '{}' cannot be the x-axis: one is already declared.",
                condition.name
            )));
        }
        self.conditions.push(condition);
        Ok(())
    }

    fn ensure_unique(&self, name: &str) -> Result<(), BayesError> {
        if name == self.output.name
            || self.fit_params.iter().any(|p| p.name == name)
            || self.conditions.iter().any(|c| c.name == name)
        {
            return Err(BayesError::config(format!("Duplicate name '{name}'.")));
        }
        Ok(())
    }

    /// Re-run every declaration check; used after deserializing.
    pub fn validate(&self) -> Result<(), BayesError> {
        let mut seen = HashSet::new();
        seen.insert(self.output.name.as_str());
        for p in &self.fit_params {
            p.validate()?;
            if !seen.insert(p.name.as_str()) {
                return Err(BayesError::config(format!("Duplicate name '{}'.", p.name)));
            }
        }
        for c in &self.conditions {
            c.validate()?;
            if !seen.insert(c.name.as_str()) {
                return Err(BayesError::config(format!("Duplicate name '{}'.", c.name)));
            }
        }
        if self.conditions.iter().filter(|c| c.is_x).count() > 1 {
            return Err(BayesError::config("At most one x-axis condition may be declared."));
        }
        Ok(())
    }

    /// Parse and validate a JSON declaration.
    pub fn from_json(text: &str) -> Result<Self, BayesError> {
        let space: ParameterSpace = serde_json::from_str(text)
            .map_err(|e| BayesError::config(format!("Invalid parameter space JSON: {e}")))?;
        space.validate()?;
        Ok(space)
    }

    pub fn fit_params(&self) -> &[FitParameter] {
        &self.fit_params
    }

    pub fn conditions(&self) -> &[ExperimentalCondition] {
        &self.conditions
    }

    pub fn output(&self) -> &OutputVariable {
        &self.output
    }

    pub fn fit_param_index(&self, name: &str) -> Option<usize> {
        self.fit_params.iter().position(|p| p.name == name)
    }

    pub fn condition_index(&self, name: &str) -> Option<usize> {
        self.conditions.iter().position(|c| c.name == name)
    }

    /// The x-axis condition: the flagged one, else the first declared.
    pub fn x_condition(&self) -> Option<usize> {
        self.conditions
            .iter()
            .position(|c| c.is_x)
            .or(if self.conditions.is_empty() { None } else { Some(0) })
    }

    /// Build the generation-0 grid.
    pub fn build_grid(&self) -> Result<Grid, BayesError> {
        self.validate()?;
        let grid = Grid::initial(&self.fit_params)?;
        info!(
            boxes = grid.len(),
            params = self.fit_params.len(),
            "built initial grid"
        );
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diode_space() -> ParameterSpace {
        let mut space = ParameterSpace::new(OutputVariable::new("lnJ"));
        space
            .add_fit_param(FitParameter::new("Bp", 10.0, 1000.0).log().with_resolution(20))
            .unwrap();
        space
            .add_fit_param(FitParameter::new("n", 1.0, 2.0).with_resolution(20))
            .unwrap();
        space.add_condition(ExperimentalCondition::new("V").as_x()).unwrap();
        space
            .add_condition(ExperimentalCondition::new("T").with_tolerance(0.1))
            .unwrap();
        space
    }

    #[test]
    fn builds_full_cross_product() {
        let grid = diode_space().build_grid().unwrap();
        assert_eq!(grid.len(), 400);
        assert_eq!(grid.dim(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut space = diode_space();
        let err = space.add_fit_param(FitParameter::new("n", 0.0, 1.0)).unwrap_err();
        assert!(matches!(err, BayesError::Configuration(_)));
        assert!(space.add_condition(ExperimentalCondition::new("Bp")).is_err());
        assert!(space.add_condition(ExperimentalCondition::new("lnJ")).is_err());
    }

    #[test]
    fn bad_resolution_or_range_is_a_configuration_error() {
        let mut space = ParameterSpace::new(OutputVariable::new("y"));
        assert!(space
            .add_fit_param(FitParameter::new("a", 0.0, 1.0).with_resolution(0))
            .is_err());
        assert!(space.add_fit_param(FitParameter::new("a", 1.0, 0.0)).is_err());
    }

    #[test]
    fn only_one_x_axis() {
        let mut space = diode_space();
        assert!(space.add_condition(ExperimentalCondition::new("I").as_x()).is_err());
        assert_eq!(space.x_condition(), Some(0));
    }

    #[test]
    fn loads_from_json() {
        let text = r#"{
            "fit_params": [
                {"name": "Bp", "lo": 10, "hi": 1000, "spacing": "log", "resolution": 20},
                {"name": "n", "lo": 1, "hi": 2, "resolution": 20, "min_width": 0.01}
            ],
            "conditions": [
                {"name": "V", "units": "V", "is_x": true},
                {"name": "T", "units": "K", "tolerance": 0.1}
            ],
            "output": {"name": "lnJ"}
        }"#;
        let space = ParameterSpace::from_json(text).unwrap();
        assert_eq!(space, diode_space_with_floor());
        assert_eq!(space.build_grid().unwrap().len(), 400);

        let dup = text.replace(r#""name": "n""#, r#""name": "Bp""#);
        assert!(matches!(
            ParameterSpace::from_json(&dup),
            Err(BayesError::Configuration(_))
        ));
    }

    fn diode_space_with_floor() -> ParameterSpace {
        let mut space = ParameterSpace::new(OutputVariable::new("lnJ"));
        space
            .add_fit_param(FitParameter::new("Bp", 10.0, 1000.0).log().with_resolution(20))
            .unwrap();
        space
            .add_fit_param(
                FitParameter::new("n", 1.0, 2.0)
                    .with_resolution(20)
                    .with_min_width(0.01),
            )
            .unwrap();
        space
            .add_condition(ExperimentalCondition::new("V").with_units("V").as_x())
            .unwrap();
        space
            .add_condition(
                ExperimentalCondition::new("T")
                    .with_units("K")
                    .with_tolerance(0.1),
            )
            .unwrap();
        space
    }
}
