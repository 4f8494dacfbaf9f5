use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;
use wfcore::{Activity, ActivityContext, ActivityError, ActivityRequest, ActivityResponse};

pub const PROVISION_EQUIPMENT: &str = "provision_equipment";
pub const PREPARE_PAPERWORK: &str = "prepare_paperwork";

/// Simulated work duration used when none is configured
pub const DEFAULT_ACTIVITY_DELAY: Duration = Duration::from_millis(2000);

/// Provides necessary equipment to the new employee
pub struct ProvisionEquipmentActivity {
    delay: Duration,
}

impl ProvisionEquipmentActivity {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ProvisionEquipmentActivity {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_DELAY)
    }
}

#[async_trait]
impl Activity for ProvisionEquipmentActivity {
    fn name(&self) -> &str {
        PROVISION_EQUIPMENT
    }

    fn description(&self) -> &str {
        "Provides necessary equipment to the new employee"
    }

    async fn execute(
        &self,
        ctx: ActivityContext,
        _request: ActivityRequest,
    ) -> Result<ActivityResponse, ActivityError> {
        Ok(simulate_work(&ctx, self.delay).await)
    }
}

/// Prepares and processes required onboarding paperwork
pub struct PreparePaperworkActivity {
    delay: Duration,
}

impl PreparePaperworkActivity {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for PreparePaperworkActivity {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_DELAY)
    }
}

#[async_trait]
impl Activity for PreparePaperworkActivity {
    fn name(&self) -> &str {
        PREPARE_PAPERWORK
    }

    fn description(&self) -> &str {
        "Prepares and processes required onboarding paperwork"
    }

    async fn execute(
        &self,
        ctx: ActivityContext,
        _request: ActivityRequest,
    ) -> Result<ActivityResponse, ActivityError> {
        Ok(simulate_work(&ctx, self.delay).await)
    }
}

/// Stand-in for real provisioning work: stamps the start, waits, stamps the end
async fn simulate_work(ctx: &ActivityContext, delay: Duration) -> ActivityResponse {
    tracing::info!(
        instance_id = %ctx.instance_id,
        activity_id = %ctx.activity_name,
        attempt = ctx.attempt,
        "Executing {}",
        ctx.activity_name
    );

    let response = ActivityResponse::start(Utc::now());
    sleep(delay).await;
    let response = response.complete(Utc::now());

    tracing::info!("{} completed successfully", ctx.activity_name);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_work_stamps_times() {
        let activity = PreparePaperworkActivity::new(Duration::from_millis(5));
        let ctx = ActivityContext::new("i-1", 0, PREPARE_PAPERWORK);

        let response = activity.execute(ctx, ActivityRequest::new()).await.unwrap();

        assert!(response.success);
        assert!(response.error.is_none());
        let end = response.end_time.unwrap();
        assert!(end >= response.start_time);
    }

    #[test]
    fn test_names_and_defaults() {
        assert_eq!(ProvisionEquipmentActivity::default().name(), "provision_equipment");
        assert_eq!(PreparePaperworkActivity::default().name(), "prepare_paperwork");
        assert_eq!(ProvisionEquipmentActivity::default().delay, Duration::from_secs(2));
    }
}
