use investment_tracker::config::lambda::{dynamo_store, load_aws_config, ses_notifier};
use investment_tracker::config::TrackerConfig;
use investment_tracker::core::report::{deliver_reports, report_subject};
use investment_tracker::utils::{logger, validation::Validate};
use investment_tracker::TrackerError;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct ResponseBody {
    pub message: String,
    pub reports_sent: usize,
}

#[derive(Serialize)]
pub struct Response {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: ResponseBody,
}

async fn function_handler(_event: LambdaEvent<Value>) -> Result<Response, Error> {
    tracing::info!("Starting daily report");

    let config = TrackerConfig::from_env()?;
    config.validate()?;
    config.validate_delivery()?;

    let sdk_config = load_aws_config().await;
    let store = dynamo_store(&sdk_config, &config);
    let notifier =
        ses_notifier(&sdk_config, &config).ok_or_else(|| TrackerError::MissingConfigError {
            field: "SENDER_EMAIL".to_string(),
        })?;
    let calculator = config.returns_calculator()?;

    let subject = report_subject(chrono::Utc::now().date_naive());
    let sent = deliver_reports(
        &config.report.recipients,
        &subject,
        &store,
        calculator.as_ref(),
        &notifier,
    )
    .await?;

    tracing::info!("Daily report completed, {} sent", sent);
    Ok(Response {
        status_code: 200,
        body: ResponseBody {
            message: "Success!".to_string(),
            reports_sent: sent,
        },
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    run(service_fn(function_handler)).await
}
