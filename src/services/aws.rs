//! AWS backend
//!
//! EC2 for discovery, CloudWatch for metrics and alarms, SNS for the
//! notification topic, IAM and STS for the account identity. All clients share
//! one SDK configuration with a fixed retry policy (standard mode, 3 attempts)
//! and connect/read timeouts.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::types::{ComparisonOperator, DimensionFilter, Statistic as CloudWatchStatistic};
use tracing::{debug, instrument, trace};

use super::backend::{
    Discovery, IdentityResolver, InstancePage, MetricCatalog, Monitoring, NotificationResolver,
};
use crate::config::Selection;
use crate::error::{ProvisionError, ProvisionResult};
use crate::{AlarmDefinition, Dimension, InstanceDescriptor, MetricSample, Platform, TagRecord};

const MAX_ATTEMPTS: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Clients for every AWS service the pipeline talks to
#[derive(Debug, Clone)]
pub struct AwsServices {
    ec2: aws_sdk_ec2::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
    sns: aws_sdk_sns::Client,
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsServices {
    /// Load credentials from the environment and build clients for `region`.
    pub async fn connect(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS))
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(CONNECT_TIMEOUT)
                    .read_timeout(READ_TIMEOUT)
                    .build(),
            )
            .load()
            .await;

        Self {
            ec2: aws_sdk_ec2::Client::new(&sdk_config),
            cloudwatch: aws_sdk_cloudwatch::Client::new(&sdk_config),
            sns: aws_sdk_sns::Client::new(&sdk_config),
            iam: aws_sdk_iam::Client::new(&sdk_config),
            sts: aws_sdk_sts::Client::new(&sdk_config),
        }
    }
}

fn sdk_error<E: std::error::Error>(operation: &'static str, err: E) -> ProvisionError {
    ProvisionError::service(operation, DisplayErrorContext(err))
}

/// Accepts both `&str` and `Option<&str>` accessors of SDK shapes.
fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}

fn descriptor(instance: &aws_sdk_ec2::types::Instance) -> Option<InstanceDescriptor> {
    let instance_id = instance.instance_id()?;
    let display_name = instance
        .tags()
        .iter()
        .find(|tag| tag.key() == Some("Name"))
        .and_then(|tag| tag.value())
        .map(String::from);

    Some(InstanceDescriptor::new(
        instance_id,
        instance
            .instance_type()
            .map(|instance_type| instance_type.as_str())
            .unwrap_or_default(),
        display_name,
        instance.image_id().map(String::from),
        Platform::from_source(instance.platform().map(|platform| platform.as_str())),
    ))
}

#[async_trait]
impl Discovery for AwsServices {
    #[instrument(skip(self))]
    async fn list_instances(
        &self,
        selection: &Selection,
        page_token: Option<String>,
    ) -> ProvisionResult<InstancePage> {
        let request = self.ec2.describe_instances().set_next_token(page_token);
        let request = match selection {
            Selection::InstanceIds(ids) => request.set_instance_ids(Some(ids.clone())),
            Selection::Tag { name, value } => request.filters(
                aws_sdk_ec2::types::Filter::builder()
                    .name(format!("tag:{name}"))
                    .values(value)
                    .build(),
            ),
        };

        let output = request
            .send()
            .await
            .map_err(|e| sdk_error("DescribeInstances", e))?;

        let instances = output
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .filter_map(descriptor)
            .collect::<Vec<_>>();

        debug!("DescribeInstances returned {} instances", instances.len());

        Ok(InstancePage {
            instances,
            next_token: output.next_token().map(String::from),
        })
    }
}

#[async_trait]
impl MetricCatalog for AwsServices {
    #[instrument(skip(self))]
    async fn list_metrics(
        &self,
        namespace: &str,
        filters: &[Dimension],
    ) -> ProvisionResult<Vec<MetricSample>> {
        let dimension_filters = filters
            .iter()
            .map(|filter| {
                DimensionFilter::builder()
                    .name(&filter.name)
                    .value(&filter.value)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProvisionError::service("ListMetrics", e))?;

        let mut pages = self
            .cloudwatch
            .list_metrics()
            .namespace(namespace)
            .set_dimensions(Some(dimension_filters))
            .into_paginator()
            .send();

        let mut samples = vec![];
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| sdk_error("ListMetrics", e))?;
            samples.extend(page.metrics().iter().map(|metric| MetricSample {
                metric_name: text(metric.metric_name()),
                dimensions: metric
                    .dimensions()
                    .iter()
                    .map(|dimension| Dimension::new(text(dimension.name()), text(dimension.value())))
                    .collect(),
            }));
        }

        trace!("ListMetrics returned {} metrics", samples.len());
        Ok(samples)
    }
}

#[async_trait]
impl NotificationResolver for AwsServices {
    #[instrument(skip(self))]
    async fn resolve_topic_arn(&self, topic_name: &str) -> ProvisionResult<String> {
        let mut pages = self.sns.list_topics().into_paginator().send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| sdk_error("ListTopics", e))?;
            if let Some(arn) = page
                .topics()
                .iter()
                .filter_map(|topic| topic.topic_arn())
                .find(|arn| arn.contains(topic_name))
            {
                return Ok(arn.to_string());
            }
        }

        Err(ProvisionError::TopicNotFound(topic_name.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for AwsServices {
    async fn account_alias(&self) -> ProvisionResult<Option<String>> {
        let output = self
            .iam
            .list_account_aliases()
            .send()
            .await
            .map_err(|e| sdk_error("ListAccountAliases", e))?;

        Ok(output.account_aliases().first().cloned())
    }

    async fn account_id(&self) -> ProvisionResult<String> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| sdk_error("GetCallerIdentity", e))?;

        output
            .account()
            .map(String::from)
            .ok_or_else(|| ProvisionError::service("GetCallerIdentity", "no account in response"))
    }
}

#[async_trait]
impl Monitoring for AwsServices {
    #[instrument(skip_all, fields(alarm = %alarm.alarm_name))]
    async fn create_alarm(&self, alarm: &AlarmDefinition) -> ProvisionResult<()> {
        let dimensions = alarm
            .dimensions
            .iter()
            .map(|dimension| {
                aws_sdk_cloudwatch::types::Dimension::builder()
                    .name(&dimension.name)
                    .value(&dimension.value)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProvisionError::service("PutMetricAlarm", e))?;

        self.cloudwatch
            .put_metric_alarm()
            .alarm_name(&alarm.alarm_name)
            .metric_name(&alarm.metric_name)
            .namespace(&alarm.namespace)
            .set_dimensions(Some(dimensions))
            .threshold(alarm.threshold)
            .comparison_operator(ComparisonOperator::from(alarm.comparison.as_str()))
            .statistic(CloudWatchStatistic::from(alarm.statistic.as_str()))
            .period(alarm.period_secs)
            .evaluation_periods(alarm.evaluation_periods)
            .treat_missing_data(alarm.missing_data.as_str())
            .actions_enabled(alarm.actions_enabled)
            .set_alarm_actions(Some(alarm.alarm_actions.clone()))
            .set_ok_actions(Some(alarm.ok_actions.clone()))
            .send()
            .await
            .map_err(|e| sdk_error("PutMetricAlarm", e))?;

        Ok(())
    }

    #[instrument(skip(self, tags))]
    async fn tag_alarm(&self, resource_arn: &str, tags: &[TagRecord]) -> ProvisionResult<()> {
        let tags = tags
            .iter()
            .map(|tag| {
                aws_sdk_cloudwatch::types::Tag::builder()
                    .key(&tag.key)
                    .value(&tag.value)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProvisionError::service("TagResource", e))?;

        self.cloudwatch
            .tag_resource()
            .resource_arn(resource_arn)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| sdk_error("TagResource", e))?;

        Ok(())
    }
}
