//! Registry fd -> Context dengan separate chaining

use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use super::context::Context;

const DEFAULT_BUCKETS: usize = 64;

pub struct HashTable {
    buckets: Vec<VecDeque<Context>>,
    len: usize,
}

impl Default for HashTable {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKETS)
    }
}

impl HashTable {
    pub fn new(buckets: usize) -> Self {
        let buckets = buckets.max(1);
        Self {
            buckets: (0..buckets).map(|_| VecDeque::new()).collect(),
            len: 0,
        }
    }

    #[inline(always)]
    fn bucket_of(&self, fd: RawFd) -> usize {
        (fd as usize) % self.buckets.len()
    }

    /// Insert context di depan chain.
    ///
    /// Jika descriptor yang sama sudah ada, context dikembalikan via `Err`
    /// dan tabel tidak berubah.
    pub fn insert(&mut self, ctx: Context) -> Result<(), Context> {
        let fd = ctx.fd();
        let idx = self.bucket_of(fd);
        let chain = &mut self.buckets[idx];
        if chain.iter().any(|c| c.fd() == fd) {
            return Err(ctx);
        }
        chain.push_front(ctx);
        self.len += 1;
        Ok(())
    }

    pub fn find(&mut self, fd: RawFd) -> Option<&mut Context> {
        let idx = self.bucket_of(fd);
        self.buckets[idx].iter_mut().find(|c| c.fd() == fd)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        let idx = self.bucket_of(fd);
        self.buckets[idx].iter().any(|c| c.fd() == fd)
    }

    /// Hapus dan kembalikan context; drop menutup socket-nya
    pub fn delete(&mut self, fd: RawFd) -> Option<Context> {
        let idx = self.bucket_of(fd);
        let chain = &mut self.buckets[idx];
        let pos = chain.iter().position(|c| c.fd() == fd)?;
        self.len -= 1;
        chain.remove(pos)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fds(&self) -> Vec<RawFd> {
        self.buckets
            .iter()
            .flat_map(|chain| chain.iter().map(Context::fd))
            .collect()
    }
}
