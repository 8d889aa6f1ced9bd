//! Production AWS backends for the gateway traits.
//!
//! Only compiled when the `aws` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! weft-core = { version = "0.1", features = ["aws"] }
//! ```
//!
//! Queues are addressed by SQS queue URL, objects by key within a single
//! bucket, and functions by Lambda ARN or name: exactly the opaque
//! identifier strings the resource map carries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_sqs::types::QueueAttributeName;

use crate::error::{Error, Result};
use crate::invoke::FunctionInvoker;
use crate::queue::{QueueClient, ReceivedMessage};
use crate::storage::ObjectStore;

/// Bundled AWS clients for one invocation.
#[derive(Debug, Clone)]
pub struct AwsClients {
    /// SQS-backed queue client.
    pub queues: Arc<SqsQueueClient>,
    /// S3-backed object store.
    pub store: Arc<S3ObjectStore>,
    /// Lambda-backed function invoker.
    pub invoker: Arc<LambdaInvoker>,
}

impl AwsClients {
    /// Builds all three backends from the ambient AWS environment.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            queues: Arc::new(SqsQueueClient::new(aws_sdk_sqs::Client::new(&config))),
            store: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&config), bucket)),
            invoker: Arc::new(LambdaInvoker::new(aws_sdk_lambda::Client::new(&config))),
        }
    }
}

/// [`QueueClient`] backed by SQS.
#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueClient {
    /// Creates a client over an existing SQS handle.
    #[must_use]
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }
}

fn clamp_secs(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn send(&self, queue: &str, body: &str) -> Result<()> {
        self.client
            .send_message()
            .queue_url(queue)
            .message_body(body)
            .send()
            .await
            .map_err(|err| Error::queue_with_source(format!("send to {queue} failed"), err))?;
        Ok(())
    }

    async fn receive_one(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue)
            .max_number_of_messages(1)
            .visibility_timeout(clamp_secs(visibility_timeout))
            .wait_time_seconds(clamp_secs(wait))
            .send()
            .await
            .map_err(|err| Error::queue_with_source(format!("receive from {queue} failed"), err))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };
        let body = message
            .body()
            .ok_or_else(|| Error::queue(format!("message from {queue} has no body")))?;
        let receipt = message
            .receipt_handle()
            .ok_or_else(|| Error::queue(format!("message from {queue} has no receipt handle")))?;
        Ok(Some(ReceivedMessage {
            body: body.to_string(),
            receipt: receipt.to_string(),
        }))
    }

    async fn delete(&self, queue: &str, receipt: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(queue)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|err| Error::queue_with_source(format!("delete from {queue} failed"), err))?;
        Ok(())
    }

    async fn approximate_depth(&self, queue: &str) -> Result<u64> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(queue)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|err| Error::queue_with_source(format!("depth of {queue} failed"), err))?;

        let depth = output
            .attributes()
            .and_then(|attributes| attributes.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .map_err(|err| Error::queue_with_source(format!("depth of {queue} unparseable"), err))?
            .unwrap_or(0);
        Ok(depth)
    }
}

/// [`ObjectStore`] backed by a single S3 bucket.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Creates a store over an existing S3 handle.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| Error::storage_with_source(format!("put of {key} failed"), err))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key)
                {
                    Error::NotFound(format!("object not found: {key}"))
                } else {
                    Error::storage_with_source(format!("get of {key} failed"), err)
                }
            })?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|err| Error::storage_with_source(format!("read of {key} failed"), err))?;
        Ok(data.into_bytes())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found) =>
            {
                Ok(false)
            }
            Err(err) => Err(Error::storage_with_source(
                format!("probe of {key} failed"),
                err,
            )),
        }
    }
}

/// [`FunctionInvoker`] backed by Lambda event-style invocation.
#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
}

impl LambdaInvoker {
    /// Creates an invoker over an existing Lambda handle.
    #[must_use]
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FunctionInvoker for LambdaInvoker {
    async fn invoke_event(&self, function: &str, payload: &Value) -> Result<()> {
        let body = serde_json::to_vec(payload).map_err(Error::serialization)?;
        self.client
            .invoke()
            .function_name(function)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(body))
            .send()
            .await
            .map_err(|err| {
                Error::invocation_with_source(format!("invoke of {function} failed"), err)
            })?;
        Ok(())
    }
}
