//! Turns the unframed byte chunks of a streamed reply into text fragments.

use crate::error::{Error, Result};
use futures::{Stream, StreamExt};
use std::fmt::Display;

/// Incremental UTF-8 decoder. A multi-byte character cut across two chunks is
/// held back until its remaining bytes arrive.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    pending: Vec<u8>,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus any carried bytes) as possible.
    /// Invalid sequences become U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            let (valid, invalid) = match std::str::from_utf8(&self.pending) {
                Ok(_) => (self.pending.len(), None),
                Err(e) => (e.valid_up_to(), Some(e.error_len())),
            };
            out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));

            match invalid {
                None => {
                    self.pending.clear();
                    break;
                }
                Some(Some(bad)) => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    self.pending.drain(..valid + bad);
                }
                // Incomplete trailing sequence: wait for the next chunk.
                Some(None) => {
                    self.pending.drain(..valid);
                    break;
                }
            }
        }
        out
    }

    /// Flush bytes left over at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

struct FragmentState<S> {
    body: S,
    decoder: FragmentDecoder,
    endpoint: String,
    done: bool,
}

/// Adapt a response body stream into text fragments, in arrival order.
///
/// Empty decodes are skipped. A transport error is yielded once as a request
/// failure and ends the stream.
pub fn fragments<S, B, E>(
    endpoint: impl Into<String>,
    body: S,
) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = FragmentState {
        body,
        decoder: FragmentDecoder::new(),
        endpoint: endpoint.into(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let text = st.decoder.decode(chunk.as_ref());
                    if !text.is_empty() {
                        return Some((Ok(text), st));
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    let err =
                        Error::request(st.endpoint.clone(), format!("stream interrupted: {e}"));
                    return Some((Err(err), st));
                }
                None => {
                    st.done = true;
                    return st.decoder.finish().map(|rest| (Ok(rest), st));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_character_is_carried() {
        let bytes = "héllo".as_bytes();
        let mut dec = FragmentDecoder::new();
        // 'é' is two bytes: split between them.
        assert_eq!(dec.decode(&bytes[..2]), "h");
        assert_eq!(dec.decode(&bytes[2..]), "éllo");
        assert_eq!(dec.finish(), None);
    }

    #[test]
    fn four_byte_character_over_three_chunks() {
        let bytes = "a🚀b".as_bytes();
        let mut dec = FragmentDecoder::new();
        assert_eq!(dec.decode(&bytes[..2]), "a");
        assert_eq!(dec.decode(&bytes[2..4]), "");
        assert_eq!(dec.decode(&bytes[4..]), "🚀b");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut dec = FragmentDecoder::new();
        assert_eq!(dec.decode(b"ok\xffgo"), "ok\u{fffd}go");
    }

    #[test]
    fn truncated_tail_is_flushed_lossily() {
        let mut dec = FragmentDecoder::new();
        assert_eq!(dec.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(dec.finish().as_deref(), Some("\u{fffd}"));
    }

    #[tokio::test]
    async fn fragments_follow_chunks() {
        let chunks: Vec<std::result::Result<&[u8], String>> = vec![
            Ok("Hello, ".as_bytes()),
            Ok("".as_bytes()),
            Ok("world".as_bytes()),
        ];
        let out: Vec<String> = fragments("/chat/stream", futures::stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["Hello, ", "world"]);
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let chunks: Vec<std::result::Result<&[u8], String>> = vec![
            Ok("partial".as_bytes()),
            Err("connection reset".into()),
            Ok("never seen".as_bytes()),
        ];
        let out: Vec<Result<String>> =
            fragments("/chat/stream", futures::stream::iter(chunks)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "partial");
        assert!(matches!(
            &out[1],
            Err(Error::Request { endpoint, .. }) if endpoint == "/chat/stream"
        ));
    }
}
