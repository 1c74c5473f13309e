use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};

use blobview_refmgmt::Closer;
use blobview_types::{mime, Digest};
use tracing::{debug, warn};

use crate::config::BlobConfig;
use crate::error::{and_close, BlobError, BlobResult};
use crate::pipe::{pipe, PipeReader, PipeWriter};
use crate::standard::for_base;
use crate::traits::{Blob, BlobAccess, BlobAccessBase, BlobReader, ReadCloser};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Compress,
    Decompress,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
        }
    }
}

/// Stream fed by a background transform thread.
///
/// Reading hits end of stream once the thread has finished; the thread is
/// joined at that point. [`close`](ReadCloser::close) always joins it and
/// returns its error. Closing before the end disconnects the pipe, which
/// stops the producer; the resulting broken pipe is not reported, but any
/// other failure of the producer, such as closing its source, is.
pub struct TransformReader {
    pipe: Option<PipeReader>,
    handle: Option<JoinHandle<BlobResult<()>>>,
    outcome: Option<BlobResult<()>>,
    eof: bool,
    closed: bool,
}

impl TransformReader {
    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(BlobError::Transform("transform thread panicked".into())));
            self.outcome = Some(result);
        }
    }
}

impl Read for TransformReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other(BlobError::Closed));
        }
        let n = match self.pipe.as_mut() {
            Some(pipe) => pipe.read(buf)?,
            None => 0,
        };
        if n > 0 || buf.is_empty() {
            return Ok(n);
        }
        self.eof = true;
        self.join();
        match &self.outcome {
            Some(Err(err)) => Err(io::Error::other(err.to_string())),
            _ => Ok(0),
        }
    }
}

impl ReadCloser for TransformReader {
    fn close(&mut self) -> BlobResult<()> {
        if self.closed {
            return Err(BlobError::Closed);
        }
        self.closed = true;
        self.pipe.take();
        self.join();
        match self.outcome.take() {
            Some(Err(err)) if !self.eof => match strip_broken_pipe(err) {
                Some(err) => Err(err),
                None => {
                    debug!("transform stopped by early close");
                    Ok(())
                }
            },
            Some(result) => result,
            None => Ok(()),
        }
    }
}

impl Drop for TransformReader {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.close() {
            warn!(error = %err, "closing dropped transform reader failed");
        }
    }
}

/// Returns `true` if `err` consists of broken pipes only.
fn is_broken_pipe(err: &BlobError) -> bool {
    match err {
        BlobError::Io(e) => e.kind() == io::ErrorKind::BrokenPipe,
        BlobError::Multiple(errors) => errors.iter().all(is_broken_pipe),
        _ => false,
    }
}

/// Drop the broken pipes from `err`, keeping every other failure.
fn strip_broken_pipe(err: BlobError) -> Option<BlobError> {
    match err {
        BlobError::Multiple(errors) => {
            let mut rest: Vec<BlobError> = errors.into_iter().filter_map(strip_broken_pipe).collect();
            match rest.len() {
                0 => None,
                1 => rest.pop(),
                _ => Some(BlobError::Multiple(rest)),
            }
        }
        err if is_broken_pipe(&err) => None,
        err => Some(err),
    }
}

fn copy_chunked<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
) -> io::Result<u64> {
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

fn compress_into(source: &mut BlobReader, sink: PipeWriter, config: &BlobConfig) -> BlobResult<()> {
    let mut encoder = zstd::stream::write::Encoder::new(sink, config.compression_level)?;
    copy_chunked(source, &mut encoder, config.chunk_size)?;
    encoder.finish()?;
    Ok(())
}

fn decompress_into(source: &mut BlobReader, mut sink: PipeWriter, config: &BlobConfig) -> BlobResult<()> {
    let mut decoder = zstd::stream::read::Decoder::new(source)?;
    copy_chunked(&mut decoder, &mut sink, config.chunk_size)?;
    Ok(())
}

/// Start a background transform of `source`, returning the consumer end.
fn spawn_transform(
    mode: Mode,
    mut source: BlobReader,
    config: &BlobConfig,
) -> BlobResult<TransformReader> {
    let (sink, pipe_reader) = pipe(config.pipe_capacity);
    let config = config.clone();
    let handle = thread::Builder::new()
        .name(format!("blob-{}", mode.name()))
        .spawn(move || {
            let result = match mode {
                Mode::Compress => compress_into(&mut source, sink, &config),
                Mode::Decompress => decompress_into(&mut source, sink, &config),
            };
            let result = and_close(result, source.close());
            if let Err(err) = &result {
                if !is_broken_pipe(err) {
                    warn!(mode = mode.name(), error = %err, "blob transform failed");
                }
            }
            result
        })?;
    Ok(TransformReader {
        pipe: Some(pipe_reader),
        handle: Some(handle),
        outcome: None,
        eof: false,
        closed: false,
    })
}

/// Base of a compressing or decompressing wrapper. Holds its own dup of
/// the wrapped blob and releases it when the wrapper goes away.
struct TransformBlob {
    blob: Blob,
    mode: Mode,
    mime: String,
    config: BlobConfig,
}

impl Closer for TransformBlob {
    type Error = BlobError;

    fn close(&self) -> BlobResult<()> {
        self.blob.close()
    }
}

impl BlobAccessBase for TransformBlob {
    fn get(&self) -> BlobResult<Vec<u8>> {
        let mut reader = self.reader()?;
        let mut data = Vec::new();
        let read = reader.read_to_end(&mut data);
        // the close result carries the transform error, if any
        match (read, reader.close()) {
            (_, Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err.into()),
            (Ok(_), Ok(())) => Ok(data),
        }
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        let source = self.blob.reader()?;
        Ok(Box::new(spawn_transform(self.mode, source, &self.config)?))
    }

    fn mime_type(&self) -> String {
        self.mime.clone()
    }

    fn digest_known(&self) -> bool {
        false
    }

    fn digest(&self) -> BlobResult<Option<Digest>> {
        Ok(None)
    }

    fn size(&self) -> BlobResult<Option<u64>> {
        Ok(None)
    }

    fn validate(&self) -> BlobResult<()> {
        self.blob.validate()
    }
}

fn wrap(blob: &dyn BlobAccess, mode: Mode, config: &BlobConfig) -> BlobResult<Blob> {
    config.validate()?;
    let inner = blob.mime_type()?;
    let mime_type = match mode {
        Mode::Compress => mime::compressed(&inner),
        Mode::Decompress => mime::decompressed(&inner),
    };
    let base = TransformBlob {
        blob: blob.dup()?,
        mode,
        mime: mime_type,
        config: config.clone(),
    };
    Ok(for_base(format!("{}ed blob", mode.name()), base))
}

/// zstd-compressing view of `blob`. The MIME type gains the `+zstd`
/// suffix; digest and size are unknown.
///
/// The wrapper holds its own reference on `blob`, so the caller may close
/// its view right away.
pub fn with_compression(blob: &dyn BlobAccess) -> BlobResult<Blob> {
    with_compression_config(blob, &BlobConfig::default())
}

pub fn with_compression_config(blob: &dyn BlobAccess, config: &BlobConfig) -> BlobResult<Blob> {
    wrap(blob, Mode::Compress, config)
}

/// zstd-decompressing view of `blob`. The `+zstd` MIME suffix is removed;
/// digest and size are unknown.
pub fn with_decompression(blob: &dyn BlobAccess) -> BlobResult<Blob> {
    with_decompression_config(blob, &BlobConfig::default())
}

pub fn with_decompression_config(blob: &dyn BlobAccess, config: &BlobConfig) -> BlobResult<Blob> {
    wrap(blob, Mode::Decompress, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::for_reader_fn;
    use crate::standard::{for_access, for_data, for_string};
    use crate::traits::DataAccess;
    use blobview_types::mime::{MIME_JSON, MIME_OCTET, MIME_TEXT, MIME_ZSTD};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn payload() -> Vec<u8> {
        (0..200_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
    }

    /// Poorly compressible bytes, so the producer outruns a small pipe.
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_f491_4f6c_dd1du64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }

    /// Source whose streams count their closes and may fail on close.
    struct CloseTracking {
        data: Vec<u8>,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    struct TrackedStream {
        inner: Cursor<Vec<u8>>,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl Read for TrackedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl ReadCloser for TrackedStream {
        fn close(&mut self) -> BlobResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(BlobError::Transform("source close failed".into()));
            }
            Ok(())
        }
    }

    impl DataAccess for CloseTracking {
        fn get(&self) -> BlobResult<Vec<u8>> {
            Ok(self.data.clone())
        }

        fn reader(&self) -> BlobResult<BlobReader> {
            Ok(Box::new(TrackedStream {
                inner: Cursor::new(self.data.clone()),
                closes: Arc::clone(&self.closes),
                fail_close: self.fail_close,
            }))
        }
    }

    fn tracked_source(mime: &str, data: Vec<u8>, fail_close: bool) -> (Blob, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let access = CloseTracking {
            data,
            closes: Arc::clone(&closes),
            fail_close,
        };
        (for_access(mime, Arc::new(access), None, None), closes)
    }

    fn small_pipe() -> BlobConfig {
        BlobConfig {
            pipe_capacity: 1,
            chunk_size: 1024,
            ..BlobConfig::default()
        }
    }

    #[test]
    fn compress_then_decompress() {
        let data = payload();
        let blob = for_data(MIME_OCTET, data.clone());
        let compressed = with_compression(blob.as_ref()).unwrap();
        let zipped = compressed.get().unwrap();
        assert!(zipped.len() < data.len());
        assert_eq!(zstd::decode_all(&zipped[..]).unwrap(), data);

        let restored = with_decompression(compressed.as_ref()).unwrap();
        assert_eq!(restored.get().unwrap(), data);
    }

    #[test]
    fn mime_types_follow_transform() {
        let blob = for_string(MIME_JSON, "{}");
        let compressed = with_compression(blob.as_ref()).unwrap();
        assert_eq!(compressed.mime_type().unwrap(), "application/json+zstd");
        let restored = with_decompression(compressed.as_ref()).unwrap();
        assert_eq!(restored.mime_type().unwrap(), MIME_JSON);

        let raw = for_data(MIME_ZSTD, zstd::encode_all(&b"x"[..], 3).unwrap());
        let plain = with_decompression(raw.as_ref()).unwrap();
        assert_eq!(plain.mime_type().unwrap(), MIME_OCTET);
        assert_eq!(plain.get().unwrap(), b"x");
    }

    #[test]
    fn metadata_is_unknown() {
        let blob = for_string(MIME_TEXT, "test");
        let compressed = with_compression(blob.as_ref()).unwrap();
        assert!(!compressed.digest_known().unwrap());
        assert_eq!(compressed.digest().unwrap(), None);
        assert_eq!(compressed.size().unwrap(), None);
    }

    #[test]
    fn wrapper_keeps_source_alive() {
        let blob = for_string(MIME_TEXT, "still here");
        let compressed = with_compression(blob.as_ref()).unwrap();
        blob.close().unwrap();

        let restored = with_decompression(compressed.as_ref()).unwrap();
        compressed.close().unwrap();
        assert_eq!(restored.get().unwrap(), b"still here");
        restored.close().unwrap();
    }

    #[test]
    fn closed_source_cannot_be_wrapped() {
        let blob = for_string(MIME_TEXT, "gone");
        blob.close().unwrap();
        assert!(with_compression(blob.as_ref()).unwrap_err().is_closed());
    }

    #[test]
    fn corrupt_input_reported_on_close() {
        let blob = for_data(MIME_ZSTD, &b"definitely not zstd"[..]);
        let plain = with_decompression(blob.as_ref()).unwrap();

        let mut reader = plain.reader().unwrap();
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
        assert!(reader.close().is_err());
        assert!(reader.close().unwrap_err().is_closed());

        assert!(plain.get().is_err());
    }

    #[test]
    fn early_close_stops_producer() {
        let config = BlobConfig {
            pipe_capacity: 1,
            chunk_size: 1024,
            ..BlobConfig::default()
        };
        let blob = for_data(MIME_OCTET, payload());
        let compressed = with_compression_config(blob.as_ref(), &config).unwrap();

        let mut reader = compressed.reader().unwrap();
        let mut first = [0u8; 16];
        reader.read_exact(&mut first).unwrap();
        reader.close().unwrap();
        assert!(reader.read(&mut first).is_err());
    }

    #[test]
    fn close_joins_and_closes_source() {
        let (blob, closes) = tracked_source(MIME_OCTET, noise(4 << 20), false);
        let compressed = with_compression_config(blob.as_ref(), &small_pipe()).unwrap();

        let mut reader = compressed.reader().unwrap();
        let mut first = [0u8; 16];
        reader.read_exact(&mut first).unwrap();
        reader.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        assert!(compressed.get().is_ok());
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn source_close_error_survives_early_close() {
        let (blob, closes) = tracked_source(MIME_OCTET, noise(8 << 20), true);
        let compressed = with_compression_config(blob.as_ref(), &small_pipe()).unwrap();

        let mut reader = compressed.reader().unwrap();
        let mut first = [0u8; 16];
        reader.read_exact(&mut first).unwrap();
        let err = reader.close().unwrap_err();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("source close failed"));
        assert!(!is_broken_pipe(&err));
    }

    #[test]
    fn transform_error_joined_with_source_close_error() {
        let (blob, closes) = tracked_source(MIME_ZSTD, b"definitely not zstd".to_vec(), true);
        let plain = with_decompression(blob.as_ref()).unwrap();

        let err = plain.get().unwrap_err();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        match err {
            BlobError::Multiple(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[1].to_string().contains("source close failed"));
            }
            other => panic!("expected both failures, got {other}"),
        }
    }

    #[test]
    fn broken_pipes_are_stripped() {
        let pipe = || BlobError::Io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(strip_broken_pipe(pipe()).is_none());
        assert!(strip_broken_pipe(BlobError::Multiple(vec![pipe(), pipe()])).is_none());

        let mixed = BlobError::Multiple(vec![pipe(), BlobError::Transform("close".into())]);
        let rest = strip_broken_pipe(mixed).unwrap();
        assert!(matches!(rest, BlobError::Transform(_)));

        let kept = strip_broken_pipe(BlobError::Closed).unwrap();
        assert!(kept.is_closed());
    }

    #[test]
    fn dropped_reader_joins_quietly() {
        let blob = for_data(MIME_OCTET, payload());
        let compressed = with_compression(blob.as_ref()).unwrap();
        let mut reader = compressed.reader().unwrap();
        let mut first = [0u8; 4];
        reader.read_exact(&mut first).unwrap();
        drop(reader);
        compressed.close().unwrap();
    }

    #[test]
    fn source_errors_propagate() {
        let access = for_reader_fn(|| -> io::Result<Cursor<Vec<u8>>> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream"))
        });
        let blob = for_access(MIME_OCTET, Arc::new(access), None, None);
        let compressed = with_compression(blob.as_ref()).unwrap();
        assert!(matches!(compressed.get(), Err(BlobError::Io(_))));
    }

    #[test]
    fn invalid_config_rejected() {
        let blob = for_string(MIME_TEXT, "x");
        let config = BlobConfig {
            pipe_capacity: 0,
            ..BlobConfig::default()
        };
        assert!(matches!(
            with_compression_config(blob.as_ref(), &config),
            Err(BlobError::Config(_))
        ));
    }

    #[test]
    fn concurrent_readers() {
        let data = payload();
        let blob = for_data(MIME_OCTET, data.clone());
        let compressed = with_compression(blob.as_ref()).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dup = compressed.dup().unwrap();
                std::thread::spawn(move || {
                    let restored = with_decompression(dup.as_ref()).unwrap();
                    dup.close().unwrap();
                    restored.get().unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), data);
        }
    }
}
