use webserv::http::reader::{try_parse, Parse, ReadError};
use webserv::http::request::Method;

const MAX: u64 = 1024 * 1024;

fn complete(raw: &[u8], max: u64) -> (webserv::http::request::Request, usize) {
    match try_parse(raw, max) {
        Parse::Complete { request, consumed } => (request, consumed),
        other => panic!("expected a complete request, got {:?}", other),
    }
}

fn failure(raw: &[u8], max: u64) -> ReadError {
    match try_parse(raw, max) {
        Parse::Failed(err) => err,
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[test]
fn parses_simple_get() {
    let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
    let (request, consumed) = complete(raw, MAX);
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.target, "/");
    assert_eq!(request.version, "HTTP/1.1");
    assert_eq!(request.header("host"), Some("x"));
    assert!(request.body.is_empty());
    assert!(!request.chunked);
    assert_eq!(consumed, raw.len());
}

#[test]
fn parses_post_with_content_length() {
    let raw = b"POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
    let (request, consumed) = complete(raw, MAX);
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.body, b"hello");
    assert_eq!(consumed, raw.len());
}

#[test]
fn header_names_are_case_insensitive() {
    let raw = b"GET / HTTP/1.1\r\nCoNtEnT-TyPe: text/plain\r\n\r\n";
    let (request, _) = complete(raw, MAX);
    assert_eq!(request.header("content-type"), Some("text/plain"));
}

#[test]
fn needs_more_while_arriving_one_byte_at_a_time() {
    let raw = b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
    for len in 0..raw.len() {
        match try_parse(&raw[..len], MAX) {
            Parse::NeedMore => {}
            other => panic!("prefix of {} bytes gave {:?}", len, other),
        }
    }
    let (request, _) = complete(raw, MAX);
    assert_eq!(request.body, b"hello");
}

#[test]
fn parses_chunked_body() {
    let raw = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let (request, consumed) = complete(raw, MAX);
    assert!(request.chunked);
    assert_eq!(request.body, b"hello world");
    assert_eq!(consumed, raw.len());
}

#[test]
fn chunked_arriving_byte_at_a_time_never_fails() {
    let raw = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                5\r\nhello\r\n0\r\n\r\n";
    for len in 0..raw.len() {
        match try_parse(&raw[..len], MAX) {
            Parse::NeedMore => {}
            other => panic!("prefix of {} bytes gave {:?}", len, other),
        }
    }
    let (request, _) = complete(raw, MAX);
    assert_eq!(request.body, b"hello");
}

#[test]
fn te_header_also_selects_chunked_mode() {
    let raw = b"POST /u HTTP/1.1\r\nTE: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
    let (request, _) = complete(raw, MAX);
    assert!(request.chunked);
    assert_eq!(request.body, b"abc");
}

#[test]
fn zero_chunk_alone_gives_empty_body() {
    let raw = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n";
    let (request, consumed) = complete(raw, MAX);
    assert!(request.body.is_empty());
    assert_eq!(consumed, raw.len());
}

#[test]
fn trailing_headers_after_zero_chunk_are_discarded() {
    let raw = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                3\r\nabc\r\n0\r\nX-Checksum: deadbeef\r\n\r\n";
    let (request, consumed) = complete(raw, MAX);
    assert_eq!(request.body, b"abc");
    assert_eq!(consumed, raw.len());
    assert!(request.header("x-checksum").is_none());
}

#[test]
fn get_with_body_is_permitted() {
    let raw = b"GET / HTTP/1.1\r\nContent-Length: 4\r\n\r\nnoop";
    let (request, _) = complete(raw, MAX);
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.body, b"noop");
}

#[test]
fn body_of_exactly_the_limit_is_accepted() {
    let raw = b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
    let (request, _) = complete(raw, 5);
    assert_eq!(request.body, b"hello");
}

#[test]
fn body_one_byte_over_the_limit_is_rejected() {
    let raw = b"POST /u HTTP/1.1\r\nContent-Length: 6\r\n\r\nhello!";
    let err = failure(raw, 5);
    assert_eq!(err, ReadError::BodyTooLarge);
    assert_eq!(err.status(), 413);
}

#[test]
fn oversized_declared_length_fails_before_the_body_arrives() {
    // Headers only; the declared length already exceeds the limit.
    let raw = b"POST /u HTTP/1.1\r\nContent-Length: 2000000\r\n\r\n";
    assert_eq!(failure(raw, 1024), ReadError::BodyTooLarge);
}

#[test]
fn chunked_body_over_the_limit_is_rejected_during_decode() {
    let raw = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                4\r\nabcd\r\n4\r\nefgh\r\n0\r\n\r\n";
    assert_eq!(failure(raw, 6), ReadError::BodyTooLarge);
}

#[test]
fn duplicate_content_length_is_rejected() {
    let raw = b"POST /u HTTP/1.1\r\nContent-Length: 2\r\nContent-Length: 2\r\n\r\nab";
    assert_eq!(failure(raw, MAX), ReadError::BadRequest);
}

#[test]
fn both_framings_at_once_are_rejected() {
    let raw = b"POST /u HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n";
    assert_eq!(failure(raw, MAX), ReadError::BadRequest);
}

#[test]
fn wrong_http_version_is_rejected() {
    let raw = b"GET / HTTP/1.0\r\n\r\n";
    let err = failure(raw, MAX);
    assert_eq!(err, ReadError::BadVersion);
    assert_eq!(err.status(), 505);
}

#[test]
fn unknown_method_is_rejected() {
    assert_eq!(failure(b"BREW / HTTP/1.1\r\n\r\n", MAX), ReadError::BadRequest);
}

#[test]
fn header_line_without_colon_is_rejected() {
    let raw = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    assert_eq!(failure(raw, MAX), ReadError::BadRequest);
}

#[test]
fn malformed_chunk_size_is_rejected() {
    let raw = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nab\r\n0\r\n\r\n";
    assert_eq!(failure(raw, MAX), ReadError::BadRequest);
}

#[test]
fn request_line_with_extra_tokens_is_rejected() {
    let raw = b"GET / HTTP/1.1 extra\r\n\r\n";
    assert_eq!(failure(raw, MAX), ReadError::BadRequest);
}

#[test]
fn query_string_is_separated_from_the_path() {
    let raw = b"GET /cgi-bin/hello.py?x=1&y=2 HTTP/1.1\r\n\r\n";
    let (request, _) = complete(raw, MAX);
    assert_eq!(request.path(), "/cgi-bin/hello.py");
    assert_eq!(request.query(), Some("x=1&y=2"));
}
