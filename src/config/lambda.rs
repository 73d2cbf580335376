use crate::adapters::notify::SesNotifier;
use crate::adapters::store::dynamo::DynamoLotStore;
use crate::config::TrackerConfig;
use aws_config::{BehaviorVersion, SdkConfig};

/// Shared AWS configuration from the default credential and region chain.
pub async fn load_aws_config() -> SdkConfig {
    aws_config::load_defaults(BehaviorVersion::latest()).await
}

pub fn dynamo_store(sdk_config: &SdkConfig, config: &TrackerConfig) -> DynamoLotStore {
    let client = aws_sdk_dynamodb::Client::new(sdk_config);
    DynamoLotStore::new(client, config.ledger.table_name.clone())
}

/// `None` when no sender is configured.
pub fn ses_notifier(sdk_config: &SdkConfig, config: &TrackerConfig) -> Option<SesNotifier> {
    let sender = config.report.sender.clone()?;
    let client = aws_sdk_sesv2::Client::new(sdk_config);
    Some(SesNotifier::new(client, sender))
}
