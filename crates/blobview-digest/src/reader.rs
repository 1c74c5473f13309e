use std::io::{self, Read};

use blobview_types::{Digest, DigestAlgorithm};

use crate::digester::Digester;

/// Reader that counts the bytes passing through it.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    /// Number of bytes read so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Reader that digests and counts the bytes passing through it.
///
/// The digest covers exactly the bytes handed out by `read`, so it is only
/// meaningful once the underlying reader has been drained.
pub struct DigestReader<R> {
    inner: CountingReader<R>,
    digester: Digester,
}

impl<R: Read> DigestReader<R> {
    pub fn new(algorithm: DigestAlgorithm, inner: R) -> Self {
        Self {
            inner: CountingReader::new(inner),
            digester: Digester::new(algorithm),
        }
    }

    /// Digest reader for the canonical algorithm.
    pub fn canonical(inner: R) -> Self {
        Self::new(DigestAlgorithm::CANONICAL, inner)
    }

    pub fn count(&self) -> u64 {
        self.inner.count()
    }

    /// Finish digesting and return the digest with the byte count.
    pub fn finish(self) -> (Digest, u64) {
        let count = self.inner.count();
        (self.digester.finalize(), count)
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digester.update(&buf[..n]);
        Ok(n)
    }
}

/// Drain a reader, returning its digest and length.
pub fn digest_reader<R: Read>(algorithm: DigestAlgorithm, reader: R) -> io::Result<(Digest, u64)> {
    let mut r = DigestReader::new(algorithm, reader);
    io::copy(&mut r, &mut io::sink())?;
    Ok(r.finish())
}
