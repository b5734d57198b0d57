//! Round-robin selection across equivalent RPC endpoints.

use {
    std::sync::atomic::{AtomicUsize, Ordering},
    trv1_rpc_client_api::client_error::{ClientError, ErrorKind},
};

/// An ordered, fixed set of base URLs handed out round-robin.
///
/// The cursor advances exactly once per call to [`next`](Self::next), wrapping
/// to zero. The advance is a single atomic update, so concurrent callers
/// interleave but never observe an out-of-range cursor.
#[derive(Debug)]
pub struct EndpointRotator {
    endpoints: Vec<String>,
    cursor: AtomicUsize,
}

impl EndpointRotator {
    pub fn new<I, U>(endpoints: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = U>,
        U: ToString,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(|url| url.to_string()).collect();
        if endpoints.is_empty() {
            return Err(ErrorKind::Custom("at least one RPC endpoint is required".to_string()).into());
        }
        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Returns the endpoint under the cursor and advances it.
    pub fn next(&self) -> &str {
        let len = self.endpoints.len();
        let index = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                cursor.wrapping_add(1).checked_rem(len)
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        &self.endpoints[index]
    }

    /// Index the next call to [`next`](Self::next) will hand out.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, std::sync::Arc};

    #[test]
    fn test_round_robin_wraps() {
        let rotator = EndpointRotator::new(["http://a", "http://b", "http://c"]).unwrap();
        let picked: Vec<&str> = (0..7).map(|_| rotator.next()).collect();
        assert_eq!(
            picked,
            vec!["http://a", "http://b", "http://c", "http://a", "http://b", "http://c", "http://a"]
        );
        assert_eq!(rotator.cursor(), 1);
    }

    #[test]
    fn test_single_endpoint() {
        let rotator = EndpointRotator::new(["http://only"]).unwrap();
        for _ in 0..3 {
            assert_eq!(rotator.next(), "http://only");
            assert_eq!(rotator.cursor(), 0);
        }
    }

    #[test]
    fn test_empty_set_rejected() {
        let err = EndpointRotator::new(Vec::<String>::new()).unwrap_err();
        assert_matches!(err.kind(), ErrorKind::Custom(_));
    }

    #[test]
    fn test_concurrent_advances_stay_in_range() {
        let rotator = Arc::new(EndpointRotator::new(["a", "b"]).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rotator = rotator.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let _ = rotator.next();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // 4_000 advances over 2 endpoints land back on 0.
        assert_eq!(rotator.cursor(), 0);
    }
}
