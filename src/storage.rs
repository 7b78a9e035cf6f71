use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

/// Result of an exclusive write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

/// Flat namespace of photo blobs addressed by file name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `body` under `name` only if nothing is stored there yet.
    async fn put_new(&self, name: &str, body: Bytes, content_type: &str)
        -> anyhow::Result<PutOutcome>;
    async fn exists(&self, name: &str) -> anyhow::Result<bool>;
    async fn read(&self, name: &str) -> anyhow::Result<Option<Bytes>>;
    /// Idempotent: deleting a missing blob succeeds.
    async fn delete(&self, name: &str) -> anyhow::Result<()>;
}

// ---- local directory ----

#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create photo dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn path(&self, name: &str) -> anyhow::Result<PathBuf> {
        let p = Path::new(name);
        anyhow::ensure!(
            !name.is_empty() && p.file_name().map(|f| f == p.as_os_str()).unwrap_or(false),
            "invalid blob name {name:?}"
        );
        Ok(self.root.join(p))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_new(
        &self,
        name: &str,
        body: Bytes,
        _content_type: &str,
    ) -> anyhow::Result<PutOutcome> {
        let path = self.path(name)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(PutOutcome::AlreadyExists),
            Err(e) => return Err(e).with_context(|| format!("create {}", path.display())),
        };
        let written = async {
            file.write_all(&body).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!(error = %cleanup, path = %path.display(), "partial photo left behind");
            }
            return Err(e).with_context(|| format!("write {}", path.display()));
        }
        debug!(%name, size = body.len(), "photo written");
        Ok(PutOutcome::Created)
    }

    async fn exists(&self, name: &str) -> anyhow::Result<bool> {
        let path = self.path(name)?;
        fs::try_exists(&path)
            .await
            .with_context(|| format!("stat {}", path.display()))
    }

    async fn read(&self, name: &str) -> anyhow::Result<Option<Bytes>> {
        let path = self.path(name)?;
        match fs::read(&path).await {
            Ok(b) => Ok(Some(Bytes::from(b))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        let path = self.path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%name, "photo already absent");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

// ---- S3 / MinIO ----

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_new(
        &self,
        name: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<PutOutcome> {
        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .if_none_match("*")
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await;
        match res {
            Ok(_) => Ok(PutOutcome::Created),
            Err(e) if e.raw_response().map(|r| r.status().as_u16()) == Some(412) => {
                Ok(PutOutcome::AlreadyExists)
            }
            Err(e) => Err(e).context("s3 put_object"),
        }
    }

    async fn exists(&self, name: &str) -> anyhow::Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await;
        match res {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()) == Some(true) => Ok(false),
            Err(e) => Err(e).context("s3 head_object"),
        }
    }

    async fn read(&self, name: &str) -> anyhow::Result<Option<Bytes>> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await;
        let out = match res {
            Ok(out) => out,
            Err(e) if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) => {
                return Ok(None)
            }
            Err(e) => return Err(e).context("s3 get_object"),
        };
        let data = out.body.collect().await.context("s3 read body")?;
        Ok(Some(data.into_bytes()))
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        // S3 DeleteObject already succeeds for missing keys.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }
}
