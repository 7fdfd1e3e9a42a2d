//! Bounds-checked cursor over untrusted bytes.
//!
//! Every read returns `None` instead of reading past the end; callers map
//! that to the error kind of their own format.

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if n > self.remaining() {
            return None;
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    pub(crate) fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Some(out)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub(crate) fn u32_le(&mut self) -> Option<u32> {
        self.take_array::<4>().map(u32::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_never_reads_past_end() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.u8(), Some(1));
        assert!(r.u32_le().is_none());
        // a failed read does not advance
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.take(2), Some(&[2u8, 3][..]));
        assert!(r.is_empty());
        assert!(r.u8().is_none());
    }

    #[test]
    fn test_reader_huge_length_is_rejected() {
        let mut r = Reader::new(&[0u8; 8]);
        assert!(r.take(usize::MAX).is_none());
        assert_eq!(r.remaining(), 8);
    }
}
