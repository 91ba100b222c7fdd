//! Composes a [`Response`] into the connection's output [`DoublingBuffer`].

use super::buffer::{BufferOversized, DoublingBuffer};
use super::response::Response;

pub fn compose(resp: &Response, out: &mut DoublingBuffer) -> Result<(), BufferOversized> {
    match resp {
        Response::Stored => out.push(b"STORED\r\n"),
        Response::NotStored => out.push(b"NOT_STORED\r\n"),
        Response::Exists => out.push(b"EXISTS\r\n"),
        Response::NotFound => out.push(b"NOT_FOUND\r\n"),
        Response::Deleted => out.push(b"DELETED\r\n"),
        Response::Ok => out.push(b"OK\r\n"),
        Response::Pong => out.push(b"PONG\r\n"),
        Response::Version(v) => {
            out.push(b"VERSION ")?;
            out.push(v.as_bytes())?;
            out.push(b"\r\n")
        }
        Response::Arith(v) => {
            out.push(v.to_string().as_bytes())?;
            out.push(b"\r\n")
        }
        Response::Values(lines) => {
            for line in lines {
                out.push(b"VALUE ")?;
                out.push(&line.key)?;
                out.push(b" ")?;
                out.push(line.flags.to_string().as_bytes())?;
                out.push(b" ")?;
                out.push(line.value.len().to_string().as_bytes())?;
                if let Some(cas) = line.cas {
                    out.push(b" ")?;
                    out.push(cas.to_string().as_bytes())?;
                }
                out.push(b"\r\n")?;
                out.push(&line.value)?;
                out.push(b"\r\n")?;
            }
            out.push(b"END\r\n")
        }
        Response::Stats(entries) => {
            for (name, value) in entries {
                out.push(b"STAT ")?;
                out.push(name.as_bytes())?;
                out.push(b" ")?;
                out.push(value.as_bytes())?;
                out.push(b"\r\n")?;
            }
            out.push(b"END\r\n")
        }
        Response::ClientError(msg) => {
            out.push(b"CLIENT_ERROR ")?;
            out.push(msg.as_bytes())?;
            out.push(b"\r\n")
        }
        Response::ServerError(msg) => {
            out.push(b"SERVER_ERROR ")?;
            out.push(msg.as_bytes())?;
            out.push(b"\r\n")
        }
        Response::Suppressed => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composed(resp: Response) -> String {
        let mut out = DoublingBuffer::new(64, 4);
        compose(&resp, &mut out).unwrap();
        String::from_utf8(out.unread().to_vec()).unwrap()
    }

    #[test]
    fn stored_line() {
        assert_eq!(composed(Response::Stored), "STORED\r\n");
    }

    #[test]
    fn value_line_without_cas() {
        let resp = Response::Values(vec![super::super::response::ValueLine {
            key: b"foo".to_vec(),
            flags: 0,
            value: b"bar".to_vec(),
            cas: None,
        }]);
        assert_eq!(composed(resp), "VALUE foo 0 3\r\nbar\r\nEND\r\n");
    }

    #[test]
    fn value_line_with_cas() {
        let resp = Response::Values(vec![super::super::response::ValueLine {
            key: b"foo".to_vec(),
            flags: 0,
            value: b"bar".to_vec(),
            cas: Some(7),
        }]);
        assert_eq!(composed(resp), "VALUE foo 0 3 7\r\nbar\r\nEND\r\n");
    }

    #[test]
    fn empty_get_is_still_just_end() {
        assert_eq!(composed(Response::Values(vec![])), "END\r\n");
    }

    #[test]
    fn suppressed_writes_nothing() {
        assert_eq!(composed(Response::Suppressed), "");
    }
}
