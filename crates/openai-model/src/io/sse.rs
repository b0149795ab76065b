use std::fmt::{self, Display};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Chunks(ChunksError),
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Chunks(err) => write!(f, "stream interrupted: {}", err.0),
            Error::InvalidPayload => f.write_str("invalid event stream payload"),
        }
    }
}

/// Reads the `data` of server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    // Trailing bytes of an UTF-8 sequence split across chunks.
    partial: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            partial: Vec::new(),
            chunks,
        }
    }

    /// Returns the data of the next event, or `None` once the stream
    /// ends. A trailing event without its blank line is discarded.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(data) = self.try_parse_event()? {
                return Ok(Some(data));
            }
            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::Chunks)?
            else {
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.partial.extend_from_slice(bytes);
        let valid_len = match str::from_utf8(&self.partial) {
            Ok(s) => s.len(),
            // `error_len() == None` means the input ended mid-character.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.partial.split_off(valid_len);
        let text = String::from_utf8(std::mem::replace(&mut self.partial, rest))
            .map_err(|_| Error::InvalidPayload)?;
        self.buf.push_str(&text);
        if self.buf.contains('\r') {
            self.buf = self.buf.replace("\r\n", "\n");
        }
        Ok(())
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // Only `data` fields matter here. Comments and other fields such
        // as `event` or `id` are skipped; an event without data is
        // skipped as a whole.
        while let Some(end) = self.buf.find("\n\n") {
            let mut data: Option<String> = None;
            for line in self.buf[..end].lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let Some((field, value)) = line.split_once(':') else {
                    return Err(Error::InvalidPayload);
                };
                if field != "data" {
                    continue;
                }
                let value = value.strip_prefix(' ').unwrap_or(value);
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }
            self.buf.drain(..end + 2);
            if data.is_some() {
                return Ok(data);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn sse_from(chunks: &[&'static [u8]]) -> Sse {
        Sse::new(Chunks::from_vec_deque(
            chunks.iter().map(|c| Bytes::from_static(c)).collect(),
        ))
    }

    #[tokio::test]
    async fn test_normal_events() {
        let mut sse = sse_from(&[b"data: hello\n\ndata: bye\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_chunks_and_crlf() {
        let mut sse = sse_from(&[b"data:", b" hello\r", b"\n\r\n", b"data: x\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        // The last event never got its blank line.
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_comments_and_other_fields() {
        let mut sse = sse_from(&[
            b": keep-alive\n\n",
            b"event: message\nid: 7\ndata: first\ndata: second\n\n",
        ]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "first\nsecond");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multibyte_split() {
        let text = "data: café\n\n".as_bytes();
        let split = text.len() - 3;
        let (head, tail) = text.split_at(split);
        let head: &'static [u8] = Box::leak(head.to_vec().into_boxed_slice());
        let tail: &'static [u8] = Box::leak(tail.to_vec().into_boxed_slice());
        let mut sse = sse_from(&[head, tail]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "café");
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let mut sse = sse_from(&[b"xxxxxx\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let mut sse = sse_from(&[b"data: \xff\xfe\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let mut sse = sse_from(&[b"data: hello\n", b"data: bye\n"]);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
