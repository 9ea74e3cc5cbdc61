/// Number of instances processed concurrently per discovery page.
pub const WORKER_POOL_SIZE: usize = 10;

/// Number of alarm definitions submitted per batch.
pub const BATCH_SIZE: usize = 10;

/// Account alias used when the account has none configured.
pub const DEFAULT_ACCOUNT_ALIAS: &str = "default-account";

const AWS_REGION: &str = "AWS_REGION";

const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

const DEFAULT_REGION: &str = "us-east-1";

pub fn get_region() -> String {
    std::env::var(AWS_REGION)
        .or_else(|_| std::env::var(AWS_DEFAULT_REGION))
        .ok()
        .filter(|region| !region.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// ARN under which CloudWatch exposes an alarm for tagging.
pub fn alarm_arn(region: &str, account_id: &str, alarm_name: &str) -> String {
    format!("arn:aws:cloudwatch:{region}:{account_id}:alarm:{alarm_name}")
}
