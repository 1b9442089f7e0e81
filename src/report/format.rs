//! Plain-text rendering of posterior summaries.

use crate::error::BayesError;
use crate::fit::{Pmf, RunSummary};
use crate::report::summary::{most_probable, parameter_estimates};
use crate::space::Grid;

/// Format the run diagnostics, per-parameter estimates and the top boxes.
pub fn format_posterior_summary(
    grid: &Grid,
    run: &RunSummary,
    top_n: usize,
) -> Result<String, BayesError> {
    let pmf = &run.posterior;
    let mut out = String::new();

    out.push_str("=== gridbayes - posterior ===\n");
    out.push_str(&format!(
        "Grid: generation={} | boxes={} | params={}\n",
        grid.generation(),
        grid.len(),
        grid.dim()
    ));
    out.push_str(&format!(
        "Run: cycles={} (concentrated {}) | observations used={}\n",
        run.cycles, run.concentrated_cycles, run.consumed
    ));

    out.push_str("\nParameters:\n");
    let estimates = parameter_estimates(grid, pmf)?;
    for (est, param) in estimates.iter().zip(grid.params()) {
        let unit = if param.units.is_empty() {
            String::new()
        } else {
            format!(" {}", param.units)
        };
        out.push_str(&format!(
            "- {:<12} mean={}{unit} spread={:.4} best={}{unit} ({:?})\n",
            truncate(&est.name, 12),
            fmt_num(est.mean),
            est.spread,
            fmt_num(est.best),
            param.spacing
        ));
    }

    out.push_str("\nMost probable boxes:\n");
    out.push_str(&format_top_table(grid, pmf, top_n)?);
    Ok(out)
}

fn format_top_table(grid: &Grid, pmf: &Pmf, top_n: usize) -> Result<String, BayesError> {
    let mut out = String::new();
    let mut header = format!("{:>6} {:>12}", "box", "prob");
    let mut rule = format!("{:-<6} {:-<12}", "", "");
    for p in grid.params() {
        header.push_str(&format!(" {:>24}", truncate(&p.name, 24)));
        rule.push_str(&format!(" {:-<24}", ""));
    }
    out.push_str(header.trim_end());
    out.push('\n');
    out.push_str(rule.trim_end());
    out.push('\n');

    for row in most_probable(grid, pmf, top_n)? {
        let mut line = format!("{:>6} {:>12.6}", row.id, row.probability);
        for a in 0..grid.dim() {
            let span = format!("[{}, {}]", fmt_num(row.lo[a]), fmt_num(row.hi[a]));
            line.push_str(&format!(" {span:>24}"));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn fmt_num(v: f64) -> String {
    let mag = v.abs();
    if mag != 0.0 && !(1e-3..1e5).contains(&mag) {
        format!("{v:.4e}")
    } else {
        format!("{v:.4}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitParameter;

    #[test]
    fn summary_lists_parameters_and_top_boxes() {
        let grid = Grid::initial(&[
            FitParameter::new("Bp", 10.0, 1000.0).log().with_resolution(2),
            FitParameter::new("n", 1.0, 2.0).with_resolution(2),
        ])
        .unwrap();
        let run = RunSummary {
            posterior: Pmf::from_probs(0, vec![0.1, 0.6, 0.2, 0.1]).unwrap(),
            cycles: 3,
            concentrated_cycles: 2,
            consumed: 12,
        };
        let text = format_posterior_summary(&grid, &run, 2).unwrap();
        assert!(text.contains("boxes=4"));
        assert!(text.contains("cycles=3 (concentrated 2)"));
        assert!(text.contains("- Bp"));
        assert!(text.contains("- n "));
        // Header, rule, and two rows.
        let table: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("Most probable"))
            .skip(1)
            .collect();
        assert_eq!(table.len(), 4);
        assert!(table[2].trim_start().starts_with('1'));
    }

    #[test]
    fn numbers_switch_to_scientific_outside_range() {
        assert_eq!(fmt_num(1.5), "1.5000");
        assert_eq!(fmt_num(2.5e-6), "2.5000e-6");
        assert_eq!(fmt_num(0.0), "0.0000");
        assert_eq!(truncate("abcdef", 4), "abc.");
    }
}
