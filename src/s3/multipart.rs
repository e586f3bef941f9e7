use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

pub(super) const PART_SIZE: u64 = 5 * 1024 * 1024; // S3 minimum part size

/// Streams one local file to a bucket key.
///
/// Files under [`PART_SIZE`] go up in a single PUT, larger ones as a
/// multipart upload that is aborted if any part fails.
pub(super) async fn upload_file(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    path: &Path,
    content_type: &str,
) -> Result<u64> {
    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    debug!(key = %key, content_type = %content_type, size, "Uploading file");

    if size < PART_SIZE {
        let body = ByteStream::from_path(path)
            .await
            .context("Failed to open file for upload")?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .context("PUT object failed")?;
        return Ok(size);
    }

    info!(key = %key, size_mb = size / 1_024 / 1_024, "Starting multipart upload");

    let created = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .content_type(content_type)
        .send()
        .await
        .context("Failed to create multipart upload")?;
    let upload_id = created.upload_id().context("No upload ID in response")?;

    match upload_parts(client, bucket, key, path, upload_id, size).await {
        Ok(parts) => {
            client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                .send()
                .await
                .context("Failed to complete multipart upload")?;
            info!(key = %key, "Multipart upload completed");
            Ok(size)
        }
        Err(e) => {
            debug!(upload_id = %upload_id, error = %e, "Aborting multipart upload");
            let _ = client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .send()
                .await;
            Err(e)
        }
    }
}

async fn upload_parts(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    path: &Path,
    upload_id: &str,
    size: u64,
) -> Result<Vec<CompletedPart>> {
    let mut file = tokio::fs::File::open(path)
        .await
        .context("Failed to open file for multipart upload")?;

    let total_parts = size.div_ceil(PART_SIZE);
    let mut parts = Vec::new();
    let mut part_number = 1;

    loop {
        let buffer = read_part(&mut file).await?;
        if buffer.is_empty() {
            break;
        }

        let output = client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(buffer))
            .send()
            .await
            .with_context(|| format!("Failed to upload part {part_number}"))?;

        let etag = output.e_tag().context("No ETag in upload part response")?;
        parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(etag)
                .build(),
        );

        debug!(key = %key, "Uploaded part {part_number}/{total_parts}");
        part_number += 1;
    }

    Ok(parts)
}

/// Fill one part buffer; a short read from `File` does not mean EOF.
async fn read_part(file: &mut tokio::fs::File) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(PART_SIZE as usize);
    file.take(PART_SIZE)
        .read_to_end(&mut buffer)
        .await
        .context("Failed to read file chunk")?;
    Ok(buffer)
}
