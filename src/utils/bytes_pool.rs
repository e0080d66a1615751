// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::{AppError, AppResult};

/// Buffers kept per size class, anything beyond is freed.
const DEFAULT_CACHED_PER_CLASS: usize = 64;

/// Scratch buffers for connection handlers, grouped in power of two size
/// classes between `min` and `max`.
#[derive(Debug)]
pub struct BytesPool {
    min: usize,
    max: usize,
    max_cached: usize,
    classes: Vec<Mutex<Vec<BytesMut>>>,
}

impl Default for BytesPool {
    fn default() -> Self {
        // 512 bytes .. 8KB
        BytesPool::build(512, 8 * 1024, DEFAULT_CACHED_PER_CLASS)
    }
}

impl BytesPool {
    /// `min` is rounded up and `max` rounded down to a power of two.
    pub fn new(min: usize, max: usize) -> AppResult<Self> {
        Self::with_capacity(min, max, DEFAULT_CACHED_PER_CLASS)
    }

    pub fn with_capacity(min: usize, max: usize, max_cached: usize) -> AppResult<Self> {
        if min == 0 || max == 0 {
            return Err(AppError::InvalidValue(format!(
                "bytes pool sizes must be positive: min {}, max {}",
                min, max
            )));
        }
        let min = min.next_power_of_two();
        let max = 1usize << max.ilog2();
        if min > max {
            return Err(AppError::InvalidValue(format!(
                "bytes pool min {} greater than max {}",
                min, max
            )));
        }
        Ok(Self::build(min, max, max_cached))
    }

    fn build(min: usize, max: usize, max_cached: usize) -> Self {
        let class_count = (max.ilog2() - min.ilog2()) as usize + 1;
        BytesPool {
            min,
            max,
            max_cached,
            classes: (0..class_count).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn class_size(&self, index: usize) -> usize {
        self.min << index
    }

    /// Smallest class that can hold `size` bytes.
    fn index_for(&self, size: usize) -> Option<usize> {
        if size > self.max {
            return None;
        }
        let size = size.max(self.min).next_power_of_two();
        Some((size.ilog2() - self.min.ilog2()) as usize)
    }

    /// Returns an empty buffer with a capacity of at least `size` bytes.
    pub fn acquire(&self, size: usize) -> BytesMut {
        if size == 0 {
            return BytesMut::new();
        }
        match self.index_for(size) {
            Some(index) => self.classes[index]
                .lock()
                .pop()
                .unwrap_or_else(|| BytesMut::with_capacity(self.class_size(index))),
            None => BytesMut::with_capacity(size),
        }
    }

    /// Gives a buffer back, it is cached in the largest class it can serve.
    pub fn release(&self, mut buf: BytesMut) {
        let capacity = buf.capacity();
        if capacity < self.min || capacity > self.max {
            return;
        }
        let index = (capacity.ilog2() - self.min.ilog2()) as usize;
        buf.clear();
        let mut class = self.classes[index].lock();
        if class.len() < self.max_cached {
            class.push(buf);
        }
    }

    pub fn cached(&self) -> usize {
        self.classes.iter().map(|class| class.lock().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(500, 3000, 512, 2048)]
    #[case(512, 2048, 512, 2048)]
    #[case(1, 1, 1, 1)]
    fn test_bounds_rounding(
        #[case] min: usize,
        #[case] max: usize,
        #[case] expect_min: usize,
        #[case] expect_max: usize,
    ) {
        let pool = BytesPool::new(min, max).unwrap();
        assert_eq!(pool.min, expect_min);
        assert_eq!(pool.max, expect_max);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(4096, 1024)]
    #[case(600, 1000)]
    fn test_invalid_bounds(#[case] min: usize, #[case] max: usize) {
        assert!(matches!(
            BytesPool::new(min, max),
            Err(AppError::InvalidValue(_))
        ));
    }

    #[rstest]
    #[case(1, 512)]
    #[case(512, 512)]
    #[case(513, 1024)]
    #[case(3000, 4096)]
    #[case(4096, 4096)]
    fn test_acquire_class_capacity(#[case] size: usize, #[case] capacity: usize) {
        let pool = BytesPool::new(512, 4096).unwrap();
        let buf = pool.acquire(size);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn test_oversized_not_pooled() {
        let pool = BytesPool::new(512, 4096).unwrap();
        let buf = pool.acquire(10_000);
        assert!(buf.capacity() >= 10_000);
        pool.release(buf);
        assert_eq!(pool.cached(), 0);
        assert_eq!(pool.acquire(0).capacity(), 0);
    }

    #[test]
    fn test_release_reuses_buffer() {
        let pool = BytesPool::new(512, 4096).unwrap();
        let mut buf = pool.acquire(1000);
        buf.extend_from_slice(b"scratch");
        let ptr = buf.as_ptr();
        pool.release(buf);
        assert_eq!(pool.cached(), 1);

        let again = pool.acquire(700);
        assert!(again.is_empty());
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.cached(), 0);
    }

    #[test]
    fn test_cache_is_bounded() {
        let pool = BytesPool::with_capacity(512, 1024, 2).unwrap();
        for _ in 0..5 {
            pool.release(BytesMut::with_capacity(512));
        }
        assert_eq!(pool.cached(), 2);
    }
}
