//! Image reference handling and pull-stream outcome rules.

use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// Stream error some engines emit while importing layers even though the
/// image ends up present.
const BENIGN_PULL_ARTIFACT: &str = "invalid tar header";

/// Split an image reference into repository and tag.
///
/// The tag separator is the last `:` after the last `/`, so registry ports
/// (`localhost:5000/app`) are not mistaken for tags. Digest references keep
/// the digest in the repository part and get an empty tag. A missing tag is
/// `latest`.
pub fn split_image_reference(image: &str) -> (String, String) {
    if image.contains('@') {
        return (image.to_string(), String::new());
    }
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (image[..split].to_string(), image[split + 1..].to_string())
        }
        None => (image.to_string(), "latest".to_string()),
    }
}

/// Whether a pull-stream error message is the harmless import artifact.
pub fn is_benign_pull_error(message: &str) -> bool {
    message.to_ascii_lowercase().contains(BENIGN_PULL_ARTIFACT)
}

/// Decide the outcome of a pull from the first stream error (if any) and
/// whether the image is present once the stream has ended.
pub fn finish_pull(
    image: &str,
    stream_error: Option<String>,
    present_after: bool,
) -> RuntimeResult<()> {
    match stream_error {
        None => Ok(()),
        Some(reason) if is_benign_pull_error(&reason) && present_after => {
            debug!(%image, %reason, "ignoring benign pull artifact");
            Ok(())
        }
        Some(reason) => Err(RuntimeError::Pull {
            image: image.to_string(),
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_and_tagged() {
        assert_eq!(
            split_image_reference("nginx:alpine"),
            ("nginx".to_string(), "alpine".to_string())
        );
        assert_eq!(
            split_image_reference("busybox"),
            ("busybox".to_string(), "latest".to_string())
        );
    }

    #[test]
    fn split_with_registry_port() {
        assert_eq!(
            split_image_reference("localhost:5000/team/app"),
            ("localhost:5000/team/app".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_reference("localhost:5000/team/app:1.2"),
            ("localhost:5000/team/app".to_string(), "1.2".to_string())
        );
    }

    #[test]
    fn split_digest() {
        let (repo, tag) = split_image_reference("nginx@sha256:abcd");
        assert_eq!(repo, "nginx@sha256:abcd");
        assert!(tag.is_empty());
    }

    #[test]
    fn benign_artifact_detection() {
        assert!(is_benign_pull_error("archive/tar: invalid tar header"));
        assert!(is_benign_pull_error("Invalid TAR header"));
        assert!(!is_benign_pull_error("manifest unknown"));
    }

    #[test]
    fn benign_artifact_with_image_present_is_success() {
        let result = finish_pull("app:1", Some("invalid tar header".to_string()), true);
        assert!(result.is_ok());
    }

    #[test]
    fn benign_artifact_without_image_is_failure() {
        let result = finish_pull("app:1", Some("invalid tar header".to_string()), false);
        assert!(matches!(result, Err(RuntimeError::Pull { .. })));
    }

    #[test]
    fn other_stream_errors_fail() {
        let result = finish_pull("app:1", Some("pull access denied".to_string()), true);
        assert!(matches!(result, Err(RuntimeError::Pull { image, .. }) if image == "app:1"));
        assert!(finish_pull("app:1", None, false).is_ok());
    }
}
