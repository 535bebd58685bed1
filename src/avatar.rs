use std::path::Path;

use log::warn;
use rand::RngCore;

use crate::entity::user::DEFAULT_AVATAR;
use crate::error::AppError;

const ALLOWED: [&str; 3] = ["png", "jpg", "jpeg"];

/// Sniffs the image type from the bytes themselves; the client's filename
/// and content type are not trusted.
pub fn image_extension(bytes: &[u8]) -> Result<&'static str, AppError> {
    match infer::get(bytes) {
        Some(kind) if ALLOWED.contains(&kind.extension()) => Ok(kind.extension()),
        _ => Err(AppError::param_error("picture", "Images only (jpg, jpeg, png)")),
    }
}

fn random_name(ext: &str) -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}.{}", hex, ext)
}

/// Writes the picture under `dir` with a random name and returns that name.
pub async fn save(dir: &Path, bytes: &[u8]) -> Result<String, AppError> {
    let ext = image_extension(bytes)?;
    let name = random_name(ext);
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        warn!("create avatar dir {} failed: {}", dir.display(), e);
        AppError::fail("upload failed")
    })?;
    tokio::fs::write(dir.join(&name), bytes).await.map_err(|e| {
        warn!("write avatar {} failed: {}", name, e);
        AppError::fail("upload failed")
    })?;
    Ok(name)
}

/// Best effort; the shared default picture is never removed.
pub async fn remove(dir: &Path, name: &str) {
    if name == DEFAULT_AVATAR || name.contains('/') || name.contains("..") {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(dir.join(name)).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("remove avatar {} failed: {}", name, e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::PNG_HEADER;
    use super::*;

    #[test]
    fn only_png_and_jpeg_pass() {
        assert_eq!(image_extension(&PNG_HEADER).unwrap(), "png");
        assert_eq!(image_extension(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]).unwrap(), "jpg");
        assert!(image_extension(b"GIF89a......").is_err());
        assert!(image_extension(b"plain text").is_err());
    }

    #[test]
    fn names_are_sixteen_hex_digits() {
        let name = random_name("png");
        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "png");
        assert_eq!(stem.len(), 16);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[actix_web::test]
    async fn save_then_remove() {
        let dir = std::env::temp_dir().join(format!("folio-avatar-{}", random_name("d")));
        let name = save(&dir, &PNG_HEADER).await.unwrap();
        assert!(dir.join(&name).exists());
        remove(&dir, &name).await;
        assert!(!dir.join(&name).exists());
        remove(&dir, DEFAULT_AVATAR).await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
