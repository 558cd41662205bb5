use std::fs::{self, File};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;
use zip::ZipArchive;

use crate::errors::{LocalnetError, LocalnetResult};

/// Fetches `url` into `destination`.
pub async fn download(url: &str, destination: &Path) -> LocalnetResult<()> {
    let http_error = |message: String| LocalnetError::Http {
        url: url.to_string(),
        message,
    };

    info!(
        target = "localnet::software",
        url,
        destination = %destination.display(),
        "downloading archive"
    );
    let response = reqwest::get(url)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| http_error(err.to_string()))?;
    let body = response
        .bytes()
        .await
        .map_err(|err| http_error(err.to_string()))?;

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| LocalnetError::io(parent, err))?;
    }
    tokio::fs::write(destination, &body)
        .await
        .map_err(|err| LocalnetError::io(destination, err))?;
    info!(target = "localnet::software", bytes = body.len(), "download finished");
    Ok(())
}

/// Unpacks a `.zip`, `.tar.gz` or `.tgz` archive into `destination`.
pub async fn extract(archive: &Path, destination: &Path) -> LocalnetResult<()> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    let task_archive = archive.clone();
    tokio::task::spawn_blocking(move || extract_blocking(&task_archive, &destination))
        .await
        .map_err(|err| LocalnetError::Archive {
            path: archive,
            message: format!("extraction task failed: {err}"),
        })?
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

fn archive_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else {
        None
    }
}

fn extract_blocking(archive: &Path, destination: &Path) -> LocalnetResult<()> {
    let archive_error = |message: String| LocalnetError::Archive {
        path: archive.to_path_buf(),
        message,
    };

    let format = archive_format(archive)
        .ok_or_else(|| archive_error("unsupported archive format".to_string()))?;
    fs::create_dir_all(destination).map_err(|err| LocalnetError::io(destination, err))?;
    let file = File::open(archive).map_err(|err| LocalnetError::io(archive, err))?;

    match format {
        ArchiveFormat::Zip => {
            let mut zip = ZipArchive::new(file).map_err(|err| archive_error(err.to_string()))?;
            zip.extract(destination)
                .map_err(|err| archive_error(err.to_string()))?;
        }
        ArchiveFormat::TarGz => {
            let mut tar = Archive::new(GzDecoder::new(file));
            tar.unpack(destination)
                .map_err(|err| archive_error(err.to_string()))?;
        }
    }

    info!(
        target = "localnet::software",
        archive = %archive.display(),
        destination = %destination.display(),
        "archive extracted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use assert_matches::assert_matches;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    #[tokio::test]
    async fn extracts_zip_archives() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("master.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("mx-chain-go-master/go.mod", FileOptions::default())
            .unwrap();
        writer.write_all(b"module mx-chain-go\n").unwrap();
        writer.finish().unwrap();

        let destination = temp.path().join("extracted");
        extract(&archive, &destination).await.expect("extract zip");
        assert_eq!(
            fs::read_to_string(destination.join("mx-chain-go-master/go.mod")).unwrap(),
            "module mx-chain-go\n"
        );
    }

    #[tokio::test]
    async fn extracts_tar_gz_archives() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("v1.0.0.tar.gz");
        let encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let payload = b"module mx-chain-proxy-go\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "mx-chain-proxy-go-1.0.0/go.mod", &payload[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let destination = temp.path().join("extracted");
        extract(&archive, &destination).await.expect("extract tar.gz");
        assert!(destination.join("mx-chain-proxy-go-1.0.0/go.mod").is_file());
    }

    #[tokio::test]
    async fn unknown_format_is_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("release.rar");
        fs::write(&archive, b"rar").unwrap();
        assert_matches!(
            extract(&archive, temp.path()).await,
            Err(LocalnetError::Archive { message, .. }) if message.contains("unsupported")
        );
    }
}
