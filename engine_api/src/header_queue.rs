use hashlink::LinkedHashMap;
use parking_lot::Mutex;
use types::{execution::Header, primitives::ExecutionBlockHash};

// Roughly 3 epochs of blocks.
const HEADER_QUEUE_CAPACITY: usize = 96;

/// Headers of payloads received from the consensus client that could not be imported yet.
///
/// A later forkchoice update may point to one of them and start a sync.
pub struct HeaderQueue {
    headers: Mutex<LinkedHashMap<ExecutionBlockHash, Header>>,
    capacity: usize,
}

impl Default for HeaderQueue {
    fn default() -> Self {
        Self::with_capacity(HEADER_QUEUE_CAPACITY)
    }
}

impl HeaderQueue {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            headers: Mutex::new(LinkedHashMap::new()),
            capacity,
        }
    }

    pub fn put(&self, hash: ExecutionBlockHash, header: Header) {
        let mut headers = self.headers.lock();

        headers.insert(hash, header);

        while headers.len() > self.capacity {
            headers.pop_front();
        }
    }

    #[must_use]
    pub fn get(&self, hash: ExecutionBlockHash) -> Option<Header> {
        self.headers.lock().get(&hash).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use types::primitives::H256;

    use super::*;

    fn header(number: u64) -> Header {
        Header {
            number,
            ..Header::post_merge_defaults()
        }
    }

    #[test]
    fn oldest_header_is_evicted_first() {
        let queue = HeaderQueue::with_capacity(2);

        queue.put(H256::repeat_byte(1), header(1));
        queue.put(H256::repeat_byte(2), header(2));
        queue.put(H256::repeat_byte(3), header(3));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(H256::repeat_byte(1)), None);
        assert_eq!(queue.get(H256::repeat_byte(2)), Some(header(2)));
        assert_eq!(queue.get(H256::repeat_byte(3)), Some(header(3)));
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let queue = HeaderQueue::default();

        queue.put(H256::repeat_byte(1), header(1));
        queue.put(H256::repeat_byte(1), header(5));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(H256::repeat_byte(1)), Some(header(5)));
    }

    #[test]
    fn default_capacity_is_96() {
        let queue = HeaderQueue::default();

        for byte in 0..=100 {
            queue.put(H256::repeat_byte(byte), header(byte.into()));
        }

        assert_eq!(queue.len(), 96);
        assert_eq!(queue.get(H256::repeat_byte(4)), None);
        assert!(queue.get(H256::repeat_byte(5)).is_some());
    }
}
