// src/cbs/store.rs
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::config::CbsConfig;
use crate::error::{IngestError, Result};

/// Remote side of the mirror: list keys under a prefix, copy one key to disk.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All keys starting with `prefix`, in store order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Write the object at `key` to `dest`, replacing any existing file.
    async fn download_to(&self, key: &str, dest: &Path) -> Result<()>;
}

/// Error codes S3 uses for rejected or missing credentials.
const AUTH_ERROR_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AccessDenied",
    "ExpiredToken",
    "InvalidToken",
];

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Static credentials when both keys are configured, otherwise the SDK
    /// default chain (which fails on the first call if it finds nothing).
    #[tracing::instrument(level = "debug", skip(cfg), fields(bucket = %cfg.bucket))]
    pub async fn new(cfg: &CbsConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(cfg.region.clone()));

        match cfg.static_credentials() {
            Some((access_key, secret_key)) => {
                let creds = Credentials::new(access_key, secret_key, None, None, "anyway_static");
                loader = loader.credentials_provider(creds);
            }
            None => {
                tracing::warn!("AWS_ACCESS_KEY/AWS_SECRET_KEY not set; using default credential chain");
            }
        }

        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        let mut s3_cfg = aws_sdk_s3::config::Builder::from(&shared);
        if cfg.endpoint.is_some() {
            // minio/localstack do not serve virtual-hosted buckets
            s3_cfg = s3_cfg.force_path_style(true);
        }

        Self {
            client: Client::from_conf(s3_cfg.build()),
            bucket: cfg.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .finish()
    }
}

fn classify<E, R>(op: &str, key: &str, err: SdkError<E, R>) -> IngestError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_owned);
    let msg = format!("{op}: {}", DisplayErrorContext(&err));

    let rejected = code
        .as_deref()
        .is_some_and(|c| AUTH_ERROR_CODES.contains(&c));
    let missing = matches!(err, SdkError::ConstructionFailure(_) | SdkError::DispatchFailure(_))
        && msg.to_ascii_lowercase().contains("credential");

    if rejected || missing {
        IngestError::Authentication(msg)
    } else {
        IngestError::transfer(key, msg)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(t) = token.take() {
                req = req.continuation_token(t);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| classify("s3 list_objects_v2", prefix, e))?;

            for obj in resp.contents() {
                if let Some(k) = obj.key() {
                    keys.push(k.to_string());
                }
            }

            if resp.is_truncated().unwrap_or(false) {
                token = resp.next_continuation_token().map(str::to_owned);
                if token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(keys)
    }

    #[tracing::instrument(level = "debug", skip(self, dest), fields(dest = %dest.display()))]
    async fn download_to(&self, key: &str, dest: &Path) -> Result<()> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("s3 get_object", key, e))?;

        let bytes = write_via_part_file(key, resp.body.into_async_read(), dest).await?;
        tracing::trace!(bytes, "object written");
        Ok(())
    }
}

/// `<dest>.part`, the sibling a download streams into before the rename.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Stream `body` into `<dest>.part`, then rename over `dest`. On failure the
/// part file is removed and an existing `dest` is left as it was.
pub(crate) async fn write_via_part_file<R>(key: &str, body: R, dest: &Path) -> Result<u64>
where
    R: AsyncRead,
{
    tokio::pin!(body);
    let part = part_path(dest);
    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| IngestError::io(&part, e))?;

    let copied = match tokio::io::copy(&mut body, &mut file).await {
        Ok(n) => file.flush().await.map(|()| n),
        Err(e) => Err(e),
    };
    drop(file);

    let n = match copied {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(IngestError::transfer(key, format!("streaming body: {e}")));
        }
    };

    if let Err(e) = tokio::fs::rename(&part, dest).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(IngestError::io(dest, e));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, ReadBuf};

    fn service_error(code: &str) -> SdkError<GetObjectError, ()> {
        let meta = ErrorMetadata::builder()
            .code(code)
            .message("from s3")
            .build();
        SdkError::service_error(GetObjectError::generic(meta), ())
    }

    #[test]
    fn rejected_credentials_are_authentication() {
        for code in ["InvalidAccessKeyId", "AccessDenied", "SignatureDoesNotMatch", "ExpiredToken"] {
            let err = classify("s3 get_object", "accidents_type_1/2020/a.csv", service_error(code));
            assert!(
                matches!(err, IngestError::Authentication(ref m) if m.contains(code)),
                "{code} -> {err:?}"
            );
        }
    }

    #[test]
    fn other_service_errors_are_transfer_for_the_key() {
        for code in ["NoSuchKey", "InternalError", "SlowDown"] {
            let err = classify("s3 get_object", "accidents_type_1/2020/a.csv", service_error(code));
            assert!(
                matches!(err, IngestError::Transfer { ref key, .. } if key == "accidents_type_1/2020/a.csv"),
                "{code} -> {err:?}"
            );
        }
    }

    #[test]
    fn missing_credential_chain_is_authentication() {
        let err: SdkError<GetObjectError, ()> =
            SdkError::construction_failure("no credentials provider was configured");
        assert!(matches!(
            classify("s3 list_objects_v2", "accidents_type_1/2020", err),
            IngestError::Authentication(_)
        ));

        let err: SdkError<GetObjectError, ()> =
            SdkError::construction_failure("invalid bucket name");
        assert_eq!(
            classify("s3 list_objects_v2", "accidents_type_1/2020", err).kind(),
            "transfer"
        );
    }

    /// Yields nothing but a connection reset.
    struct ResetBody;

    impl AsyncRead for ResetBody {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")))
        }
    }

    #[tokio::test]
    async fn part_file_is_renamed_into_place() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("a.csv");

        let n = write_via_part_file("k", &b"id,year\n1,2020\n"[..], &dest)
            .await
            .unwrap();

        assert_eq!(n, 15);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "id,year\n1,2020\n");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn broken_stream_keeps_previous_file_and_drops_part() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("a.csv");
        std::fs::write(&dest, "previous run").unwrap();

        let body = (&b"half a ro"[..]).chain(ResetBody);
        let err = write_via_part_file("accidents_type_1/2020/a.csv", body, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Transfer { .. }));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "previous run");
        assert!(!part_path(&dest).exists());
    }
}
