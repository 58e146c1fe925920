use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Splits a serial byte stream on `\n`.
///
/// Trailing bytes without a delimiter stay buffered until the next chunk
/// arrives. There is no bound on how long a line may grow.
#[derive(Debug, Default)]
pub struct LineDecoder {
    // Offset already scanned in the current buffer, so a long partial line
    // is not rescanned from the start on every chunk.
    next_index: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        let start = self.next_index.min(buf.len());
        let offset = buf[start..].iter().position(|b| *b == b'\n');
        match offset {
            Some(offset) => {
                let newline = start + offset;
                self.next_index = 0;
                let line = buf.split_to(newline + 1);
                let line = &line[..line.len() - 1];
                Ok(Some(String::from_utf8_lossy(line).into_owned()))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        // A partial record at end of stream is not a line.
        let line = self.decode(buf)?;
        if line.is_none() {
            buf.clear();
            self.next_index = 0;
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    use super::*;

    #[test]
    fn test_partial_line_is_buffered() {
        let mut decoder = LineDecoder::new();
        let mut buf = BytesMut::from(&b"accel_x:1\tacc"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 13);

        buf.extend_from_slice(b"el_y:2\nnext");
        assert_eq!(
            decoder.decode(&mut buf).unwrap().as_deref(),
            Some("accel_x:1\taccel_y:2")
        );
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"next");
    }

    #[test]
    fn test_splits_only_on_newline() {
        let mut decoder = LineDecoder::new();
        let mut buf = BytesMut::from(&b"a\r\n\nb\n"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("a\r"));
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some(""));
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("b"));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_framed_read_drops_unterminated_tail() {
        let input: &[u8] = b"one\ntwo\nthr";
        let lines: Vec<String> = FramedRead::new(input, LineDecoder::new())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }
}
