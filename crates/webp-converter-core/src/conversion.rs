//! Single-image conversion.
//!
//! [`ConversionEngine::convert`] never returns an error: every failure along
//! the way (denied path, missing file, unsupported extension, codec or I/O
//! error) is reported as a [`ConversionResult::Failure`] carrying the path
//! exactly as the caller supplied it.
//!
//! A panicking codec is contained here too and reported as a codec error.
//!
//! Writing the output and deleting the source are two separate steps. A crash
//! between them leaves both files on disk.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, warn};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::codec::{ImageCodec, WebpCodec};
use crate::error::{Error, Result};
use crate::logging::{log_file_error, log_fs_modification};
use crate::safety::PathGuard;
use crate::types::{
    display_extension, ConversionRequest, ConversionResult, ConversionSuccess, ImageFormat,
};

/// Input path reported for conversions of inline base64 payloads
pub const INLINE_INPUT: &str = "<inline base64>";

/// Converts individual images inside the guard's allowed roots
#[derive(Debug, Clone)]
pub struct ConversionEngine<C = WebpCodec> {
    guard: PathGuard,
    codec: C,
}

impl ConversionEngine<WebpCodec> {
    /// Create an engine using the WebP codec
    pub fn new(guard: PathGuard) -> Self {
        Self::with_codec(guard, WebpCodec)
    }
}

impl<C: ImageCodec> ConversionEngine<C> {
    /// Create an engine with a specific codec
    pub fn with_codec(guard: PathGuard, codec: C) -> Self {
        Self { guard, codec }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Output path for `source`: same directory and stem, codec extension.
    /// An existing file at that path is overwritten.
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        source.with_extension(self.codec.extension())
    }

    /// Convert one image file
    pub fn convert(&self, request: &ConversionRequest) -> ConversionResult {
        match self.try_convert(request) {
            Ok(success) => ConversionResult::Success(success),
            Err(e) => {
                warn!("Conversion failed for {}: {}", request.source_path.display(), e);
                ConversionResult::failure(&request.source_path, e)
            }
        }
    }

    fn try_convert(&self, request: &ConversionRequest) -> Result<ConversionSuccess> {
        let options = request.options;
        let input_path = self.guard.resolve(&request.source_path);

        if !self.guard.is_allowed(&input_path) {
            return Err(Error::AccessDenied(input_path));
        }

        if !input_path.exists() {
            return Err(Error::NotFound(input_path));
        }

        let supported = ImageFormat::from_path(&input_path)
            .map(|format| format.is_supported_input())
            .unwrap_or(false);
        if !supported {
            return Err(Error::UnsupportedFormat(display_extension(&input_path)));
        }

        let bytes = fs::read(&input_path).map_err(|e| {
            log_file_error(&input_path, "read", &e);
            e
        })?;

        let output_path = self.output_path_for(&input_path);
        debug!(
            "Encoding {} ({} bytes) -> {} [quality={}, lossless={}]",
            input_path.display(),
            bytes.len(),
            output_path.display(),
            options.quality,
            options.lossless
        );

        let encoded = self.encode(&bytes, options.quality, options.lossless)?;
        write_output(&output_path, &encoded)?;

        if !options.keep_original {
            fs::remove_file(&input_path).map_err(|e| {
                log_file_error(&input_path, "delete", &e);
                e
            })?;
            log_fs_modification("delete", &input_path, Some("source replaced by conversion"));
        }

        let size_after = fs::metadata(&output_path)?.len();
        // Once the source is gone its size is reported from the output file
        let size_before = if options.keep_original {
            fs::metadata(&input_path)?.len()
        } else {
            size_after
        };

        Ok(ConversionSuccess {
            input_path,
            output_path,
            size_before,
            size_after,
            quality: options.quality,
            lossless: options.lossless,
        })
    }

    /// Convert an inline base64 image (optionally a `data:` URL) and write
    /// the result to exactly `output_path`.
    pub fn convert_base64<P: AsRef<Path>>(
        &self,
        payload: &str,
        output_path: P,
        quality: u8,
        lossless: bool,
    ) -> ConversionResult {
        let quality = quality.min(100);
        match self.try_convert_base64(payload, output_path.as_ref(), quality, lossless) {
            Ok(success) => ConversionResult::Success(success),
            Err(e) => {
                warn!(
                    "Inline conversion to {} failed: {}",
                    output_path.as_ref().display(),
                    e
                );
                ConversionResult::failure(INLINE_INPUT, e)
            }
        }
    }

    fn try_convert_base64(
        &self,
        payload: &str,
        output_path: &Path,
        quality: u8,
        lossless: bool,
    ) -> Result<ConversionSuccess> {
        let output_path = self.guard.resolve(output_path);
        if !self.guard.is_allowed(&output_path) {
            return Err(Error::AccessDenied(output_path));
        }

        let bytes = decode_payload(payload)?;
        let encoded = self.encode(&bytes, quality, lossless)?;
        write_output(&output_path, &encoded)?;

        Ok(ConversionSuccess {
            input_path: PathBuf::from(INLINE_INPUT),
            size_before: bytes.len() as u64,
            size_after: fs::metadata(&output_path)?.len(),
            output_path,
            quality,
            lossless,
        })
    }

    /// Run the codec, turning a panic inside it into [`Error::Codec`]
    fn encode(&self, bytes: &[u8], quality: u8, lossless: bool) -> Result<Vec<u8>> {
        panic::catch_unwind(AssertUnwindSafe(|| self.codec.encode(bytes, quality, lossless)))
            .unwrap_or_else(|payload| {
                Err(Error::Codec(format!("encoder panicked: {}", panic_message(&*payload))))
            })
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| {
        log_file_error(path, "write", &e);
        e
    })?;
    log_fs_modification("write", path, Some(&format!("{} bytes", bytes.len())));
    Ok(())
}

/// Decode a base64 payload, accepting an optional `data:<mime>;base64,`
/// prefix and embedded whitespace
pub fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let trimmed = payload.trim();
    let data = match trimmed.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((_, data)) => data,
            None => return Err(Error::InvalidPayload("malformed data URL".to_string())),
        },
        None => trimmed,
    };

    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(Error::InvalidPayload("empty payload".to_string()));
    }

    Ok(STANDARD.decode(cleaned)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversionOptions;
    use tempfile::tempdir;

    /// Codec that upper-cases its input so tests need no real images
    struct EchoCodec;

    impl ImageCodec for EchoCodec {
        fn extension(&self) -> &str {
            "webp"
        }

        fn encode(&self, bytes: &[u8], _quality: u8, _lossless: bool) -> Result<Vec<u8>> {
            if bytes.starts_with(b"BROKEN") {
                return Err(Error::Codec("cannot decode".to_string()));
            }
            Ok(bytes.to_ascii_uppercase())
        }
    }

    /// Codec that always panics, like libwebp bindings on unexpected input
    struct PanickingCodec;

    impl ImageCodec for PanickingCodec {
        fn extension(&self) -> &str {
            "webp"
        }

        fn encode(&self, _bytes: &[u8], _quality: u8, _lossless: bool) -> Result<Vec<u8>> {
            panic!("VP8_ENC_ERROR_BAD_DIMENSION");
        }
    }

    fn engine(root: &Path) -> ConversionEngine<EchoCodec> {
        ConversionEngine::with_codec(PathGuard::with_base(&[root], root), EchoCodec)
    }

    fn expect_success(result: ConversionResult) -> ConversionSuccess {
        match result {
            ConversionResult::Success(success) => success,
            other => panic!("expected success, got {:?}", other),
        }
    }

    fn keep() -> ConversionOptions {
        ConversionOptions {
            keep_original: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_output_path_replaces_extension() {
        let engine = ConversionEngine::new(PathGuard::permit_all());
        assert_eq!(
            engine.output_path_for(Path::new("/x/photo.JPEG")),
            PathBuf::from("/x/photo.webp")
        );
        assert_eq!(
            engine.output_path_for(Path::new("/x/my.holiday.png")),
            PathBuf::from("/x/my.holiday.webp")
        );
    }

    #[test]
    fn test_convert_keeps_original() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.png");
        fs::write(&source, b"pixels!").unwrap();

        let result = engine(dir.path()).convert(&ConversionRequest::new(&source, keep()));
        let success = expect_success(result);

        assert!(source.exists());
        assert_eq!(success.output_path, dir.path().join("a.webp"));
        assert_eq!(fs::read(&success.output_path).unwrap(), b"PIXELS!");
        assert_eq!(success.size_before, 7);
        assert_eq!(success.size_after, 7);
        assert_eq!(success.quality, 80);
        assert!(!success.lossless);
    }

    #[test]
    fn test_convert_resolves_relative_paths_against_base() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("rel.jpg"), b"x").unwrap();

        let result = engine(dir.path()).convert(&ConversionRequest::new("./sub/../rel.jpg", keep()));
        let success = expect_success(result);
        assert_eq!(success.input_path, dir.path().join("rel.jpg"));
    }

    #[test]
    fn test_failure_carries_unresolved_path() {
        let dir = tempdir().unwrap();
        let result = engine(dir.path()).convert(&ConversionRequest::new("missing.png", keep()));

        assert_eq!(result.input_path(), Path::new("missing.png"));
        assert!(result.error().unwrap().contains("input file does not exist"));
    }

    #[test]
    fn test_denied_before_existence_check() {
        let allowed = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let source = outside.path().join("b.png");
        fs::write(&source, b"x").unwrap();

        let result = engine(allowed.path()).convert(&ConversionRequest::new(&source, keep()));
        assert!(result
            .error()
            .unwrap()
            .starts_with("access denied, path outside allowed root(s)"));
        assert!(!outside.path().join("b.webp").exists());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        for name in ["anim.gif", "ANIM.GIF", "noext"] {
            fs::write(dir.path().join(name), b"GIF89a").unwrap();
        }

        let engine = engine(dir.path());
        let gif = engine.convert(&ConversionRequest::new(dir.path().join("anim.gif"), keep()));
        assert_eq!(gif.error(), Some("unsupported image format: .gif"));

        let upper = engine.convert(&ConversionRequest::new(dir.path().join("ANIM.GIF"), keep()));
        assert_eq!(upper.error(), Some("unsupported image format: .gif"));

        let none = engine.convert(&ConversionRequest::new(dir.path().join("noext"), keep()));
        assert_eq!(none.error(), Some("unsupported image format: "));
    }

    #[test]
    fn test_codec_failure_leaves_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("bad.png");
        fs::write(&source, b"BROKEN").unwrap();

        let result = engine(dir.path())
            .convert(&ConversionRequest::new(&source, ConversionOptions::default()));
        assert_eq!(result.error(), Some("image codec error: cannot decode"));
        assert!(source.exists());
        assert!(!dir.path().join("bad.webp").exists());
    }

    #[test]
    fn test_codec_panic_becomes_failure() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("wide.png");
        fs::write(&source, b"pixels").unwrap();
        let engine =
            ConversionEngine::with_codec(PathGuard::with_base(&[dir.path()], dir.path()), PanickingCodec);

        let result = engine.convert(&ConversionRequest::new(&source, ConversionOptions::default()));
        assert_eq!(
            result.error(),
            Some("image codec error: encoder panicked: VP8_ENC_ERROR_BAD_DIMENSION")
        );
        assert!(source.exists());
        assert!(!dir.path().join("wide.webp").exists());

        let inline = engine.convert_base64("aGVsbG8=", dir.path().join("inline.webp"), 80, false);
        assert!(inline.error().unwrap().contains("encoder panicked"));
    }

    #[test]
    fn test_panic_message_downcasts_payload() {
        let owned = panic::catch_unwind(|| panic!("{} failed", "encode")).unwrap_err();
        assert_eq!(panic_message(&*owned), "encode failed");

        let fixed = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*fixed), "static");
    }

    #[test]
    fn test_decode_payload_variants() {
        assert_eq!(decode_payload("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_payload("data:image/png;base64,aGVs\nbG8=").unwrap(), b"hello");
        assert!(matches!(decode_payload("   "), Err(Error::InvalidPayload(_))));
        assert!(matches!(decode_payload("data:image/png"), Err(Error::InvalidPayload(_))));
        assert!(matches!(decode_payload("not base64!"), Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_convert_base64_writes_exact_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("inline.webp");

        let result = engine(dir.path()).convert_base64("aGVsbG8=", &output, 200, true);
        let success = expect_success(result);

        assert_eq!(fs::read(&output).unwrap(), b"HELLO");
        assert_eq!(success.input_path, PathBuf::from(INLINE_INPUT));
        assert_eq!(success.size_before, 5);
        assert_eq!(success.quality, 100);
        assert!(success.lossless);
    }

    #[test]
    fn test_convert_base64_output_is_guarded() {
        let allowed = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let output = outside.path().join("escape.webp");

        let result = engine(allowed.path()).convert_base64("aGVsbG8=", &output, 80, false);
        assert!(result.error().unwrap().starts_with("access denied"));
        assert!(!output.exists());
    }
}
