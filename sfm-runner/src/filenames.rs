use crate::{Error, LocalizationConfig, Matcher, RansacMethod, Result};
use serde_json::Number;

fn threshold(value: &Option<Number>, name: &str, method: RansacMethod) -> Result<String> {
    value.as_ref().map(Number::to_string).ok_or_else(|| {
        Error::Unsupported(format!("ransac method {} needs `{}`", method.name(), name))
    })
}

fn ransac_postfix(config: &LocalizationConfig) -> Result<String> {
    let ransac = &config.ransac;
    Ok(match ransac.method {
        None => String::new(),
        Some(method @ (RansacMethod::Ransac | RansacMethod::Solver)) => {
            let tag = match method {
                RansacMethod::Solver => "sfransac",
                _ => method.name(),
            };
            format!("_{}_{}", tag, threshold(&ransac.thres, "thres", method)?)
        }
        Some(RansacMethod::Hybrid) => format!(
            "_hybrid_{}-{}",
            threshold(&ransac.thres_point, "thres_point", RansacMethod::Hybrid)?,
            threshold(&ransac.thres_line, "thres_line", RansacMethod::Hybrid)?
        ),
    })
}

/// Names of the point-only and the point+line results files of a localization run.
///
/// ```
/// use sfm_runner::{result_filenames, RunConfig};
/// let config = RunConfig::from_json(r#"{
///     "localization": {
///         "2d_matcher": "sold2",
///         "reprojection_filter": "Perpendicular",
///         "ransac": {"method": "hybrid", "thres_point": 5.0, "thres_line": 5.0}
///     }
/// }"#).unwrap();
/// let (point, joint) = result_filenames(&config.localization, true).unwrap();
/// assert_eq!(point, "results_dense_point.txt");
/// assert_eq!(
///     joint,
///     "results_dense_joint_sold2_Perpendicular_PerpendicularDist_hybrid_5.0-5.0.txt"
/// );
/// ```
pub fn result_filenames(config: &LocalizationConfig, dense: bool) -> Result<(String, String)> {
    let density = if dense { "dense" } else { "sparse" };
    let mut point = format!("results_{}_point.txt", density);
    let mut joint = format!(
        "results_{}_joint_{}_{}{}{}{}.txt",
        density,
        config.matcher,
        config
            .reprojection_filter
            .as_ref()
            .map(|filter| format!("{}_", filter))
            .unwrap_or_default(),
        if config.matcher == Matcher::SuperglueEndpoints && config.epipolar_filter {
            "filtered_"
        } else {
            ""
        },
        config.line_cost_func,
        ransac_postfix(config)?
    );
    if config.matcher == Matcher::Gluestick {
        point = point.replace("point", "point_gluestick");
        joint = joint.replace("gluestick", "gluestickp+l");
    }
    Ok((point, joint))
}
