//! Minimal pickle protocol-2 writer for metric batches.
//!
//! The Graphite bulk ingest port expects a pickled list of
//! `(path, (timestamp, value))` tuples, each message prefixed with a 4-byte
//! big-endian length header. Only that one shape is ever encoded, so this
//! module writes the handful of opcodes directly instead of pulling in a
//! general serializer.

/// One metric point: `(dotted path, (unix seconds, value))`.
pub type Point = (String, (f64, f64));

const PROTO: &[u8] = b"\x80\x02";
const EMPTY_LIST: u8 = b']';
const MARK: u8 = b'(';
const BINUNICODE: u8 = b'X';
const BINFLOAT: u8 = b'G';
const TUPLE2: u8 = b'\x86';
const APPENDS: u8 = b'e';
const STOP: u8 = b'.';

/// Encodes one batch of points as a pickled list.
#[must_use]
pub fn encode_batch(points: &[Point]) -> Vec<u8> {
    // Rough size guess: opcodes plus path bytes plus two 9-byte floats.
    let mut out = Vec::with_capacity(
        16 + points
            .iter()
            .map(|(path, _)| path.len() + 32)
            .sum::<usize>(),
    );
    out.extend_from_slice(PROTO);
    out.push(EMPTY_LIST);
    if !points.is_empty() {
        out.push(MARK);
        for (path, (timestamp, value)) in points {
            put_str(&mut out, path);
            put_f64(&mut out, *timestamp);
            put_f64(&mut out, *value);
            out.push(TUPLE2); // (timestamp, value)
            out.push(TUPLE2); // (path, (timestamp, value))
        }
        out.push(APPENDS);
    }
    out.push(STOP);
    out
}

/// Prepends the 4-byte big-endian length header.
#[must_use]
pub fn frame(payload: Vec<u8>) -> Vec<u8> {
    let mut message = Vec::with_capacity(payload.len() + 4);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(&payload);
    message
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.push(BINUNICODE);
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn put_f64(out: &mut Vec<u8>, v: f64) {
    out.push(BINFLOAT);
    out.extend_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_is_valid_pickle() {
        let bytes = encode_batch(&[]);
        assert_eq!(bytes, b"\x80\x02].");
    }

    #[test]
    fn single_point_layout() {
        let bytes = encode_batch(&[("a.b".to_string(), (1.0, 2.0))]);
        let mut expected: Vec<u8> = Vec::new();
        expected.extend_from_slice(b"\x80\x02](");
        expected.push(b'X');
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(b"a.b");
        expected.push(b'G');
        expected.extend_from_slice(&1.0f64.to_be_bytes());
        expected.push(b'G');
        expected.extend_from_slice(&2.0f64.to_be_bytes());
        expected.extend_from_slice(b"\x86\x86e.");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn frame_prepends_big_endian_length() {
        let framed = frame(vec![0xAA; 300]);
        assert_eq!(&framed[..4], &300u32.to_be_bytes());
        assert_eq!(framed.len(), 304);
    }
}
