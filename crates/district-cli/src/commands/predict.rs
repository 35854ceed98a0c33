//! Predict command implementation.

use crate::{print_json, CliResult, JsonDirSource, ManagerArgs};
use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use district_serving::{CollectedData, ModelKind, ModelManager};
use serde::Serialize;
use std::path::PathBuf;

/// Run a ready model against one location
///
/// # Example
///
/// ```bash
/// district predict forecast --data /srv/records --area 3110008 --category CS100001
/// district predict recommend --data /srv/records --area 3110008
/// ```
#[derive(Args, Debug, Clone)]
pub struct PredictCommand {
    /// What to predict
    #[command(subcommand)]
    pub target: PredictTarget,
}

/// Prediction kinds
#[derive(Subcommand, Debug, Clone)]
pub enum PredictTarget {
    /// Next four quarters of one category's revenue with a 95% band
    Forecast(ForecastArgs),
    /// 1, 3 and 5-year survival probability
    Survival(LocationArgs),
    /// Location score, 0 to 100
    Score(LocationArgs),
    /// Every category ranked by fit
    Recommend(LocationArgs),
}

/// Where the records are and which location to predict for.
#[derive(Args, Debug, Clone)]
pub struct LocationArgs {
    /// Record directory with one sub-directory per quarter
    #[arg(long, env = "DISTRICT_DATA_DIR")]
    pub data: PathBuf,

    /// Location code
    #[arg(long, short = 'a')]
    pub area: String,
}

/// Location plus the category to forecast.
#[derive(Args, Debug, Clone)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub location: LocationArgs,

    /// Category code, e.g. CS100001
    #[arg(long)]
    pub category: String,
}

impl PredictTarget {
    fn kind(&self) -> ModelKind {
        match self {
            PredictTarget::Forecast(_) => ModelKind::SalesLstm,
            PredictTarget::Survival(_) => ModelKind::SurvivalMlp,
            PredictTarget::Score(_) => ModelKind::ScoringEnsemble,
            PredictTarget::Recommend(_) => ModelKind::Recommendation,
        }
    }

    fn location(&self) -> &LocationArgs {
        match self {
            PredictTarget::Forecast(args) => &args.location,
            PredictTarget::Survival(args) | PredictTarget::Score(args) | PredictTarget::Recommend(args) => args,
        }
    }
}

#[derive(Serialize)]
struct ScoreOutput<'a> {
    area_code: &'a str,
    total_score: i32,
}

impl PredictCommand {
    /// Execute the predict command
    pub async fn run(&self, args: &ManagerArgs) -> CliResult<()> {
        let manager = args.manager()?;
        let kind = self.target.kind();
        if !manager.is_ready(kind) {
            bail!("{kind} has no trained version; run `district train` first");
        }

        let location = self.target.location();
        let source = JsonDirSource::new(&location.data);
        let data = CollectedData::collect(&source, &manager.config().quarters)
            .await
            .with_context(|| format!("Failed to read records from {}", location.data.display()))?;

        let printed = self.predict(&manager, &data, &location.area)?;
        if !printed {
            bail!("{kind} produced no prediction for {}", location.area);
        }
        Ok(())
    }

    /// Prints the prediction; false when the model declined to answer.
    fn predict(&self, manager: &ModelManager, data: &CollectedData, area: &str) -> CliResult<bool> {
        let latest = data.latest();
        match &self.target {
            PredictTarget::Forecast(args) => {
                let forecast = manager.predict_sales_forecast(
                    area,
                    &args.category,
                    &data.pop_by_q,
                    &data.sales_by_q,
                    &data.stores_by_q,
                );
                forecast.map(|f| print_json(&f)).transpose().map(|o| o.is_some())
            }
            PredictTarget::Survival(_) => manager
                .predict_survival(area, latest)
                .map(|s| print_json(&s))
                .transpose()
                .map(|o| o.is_some()),
            PredictTarget::Score(_) => manager
                .predict_score(area, latest)
                .map(|total_score| {
                    print_json(&ScoreOutput {
                        area_code: area,
                        total_score,
                    })
                })
                .transpose()
                .map(|o| o.is_some()),
            PredictTarget::Recommend(_) => manager
                .recommend(area, latest)
                .map(|ranked| print_json(&ranked))
                .transpose()
                .map(|o| o.is_some()),
        }
    }
}
