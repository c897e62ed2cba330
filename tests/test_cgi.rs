use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use webserv::config;
use webserv::handlers::cgi::{self, CgiStatus};
use webserv::http::request::{Method, Request};

fn script_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("webserv-cgi-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_script(dir: &PathBuf, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn collects_stdout_of_a_successful_script() {
    let dir = script_dir("hello");
    let script = write_script(&dir, "hello.sh", "echo Hello\n");
    let outcome = cgi::execute("/bin/sh", &script, b"", HashMap::new()).unwrap();
    assert_eq!(outcome.status, CgiStatus::Success(0));
    assert_eq!(outcome.stdout, b"Hello\n");
}

#[test]
fn feeds_the_request_body_on_stdin() {
    let dir = script_dir("stdin");
    // The executor clears the environment, so name the binary outright.
    let script = write_script(&dir, "echo.sh", "/bin/cat\n");
    let outcome = cgi::execute("/bin/sh", &script, b"payload bytes", HashMap::new()).unwrap();
    assert_eq!(outcome.status, CgiStatus::Success(0));
    assert_eq!(outcome.stdout, b"payload bytes");
}

#[test]
fn exposes_the_supplied_environment() {
    let dir = script_dir("env");
    let script = write_script(
        &dir,
        "env.sh",
        "echo \"method=$REQUEST_METHOD query=$QUERY_STRING\"\n",
    );
    let mut env = HashMap::new();
    env.insert("REQUEST_METHOD".to_string(), "GET".to_string());
    env.insert("QUERY_STRING".to_string(), "x=1".to_string());
    let outcome = cgi::execute("/bin/sh", &script, b"", env).unwrap();
    assert_eq!(outcome.stdout, b"method=GET query=x=1\n");
}

#[test]
fn reports_nonzero_exit_codes() {
    let dir = script_dir("exit");
    let script = write_script(&dir, "fail.sh", "exit 3\n");
    let outcome = cgi::execute("/bin/sh", &script, b"", HashMap::new()).unwrap();
    assert_eq!(outcome.status, CgiStatus::Success(3));
}

#[test]
fn kills_scripts_that_outlive_the_deadline() {
    let dir = script_dir("timeout");
    let script = write_script(&dir, "slow.sh", "/bin/sleep 30\n");
    let outcome = cgi::execute_with_deadline(
        "/bin/sh",
        &script,
        b"",
        HashMap::new(),
        Duration::from_millis(300),
    )
    .unwrap();
    assert_eq!(outcome.status, CgiStatus::Timeout);
}

#[test]
fn missing_interpreter_is_an_error() {
    let dir = script_dir("nointerp");
    let script = write_script(&dir, "x.sh", "echo hi\n");
    assert!(cgi::execute("/no/such/interpreter", &script, b"", HashMap::new()).is_err());
}

#[test]
fn builds_the_cgi_1_1_environment() {
    let source = "server { listen 8090; server_name example; root /var/www; }";
    let config = config::from_source(source).unwrap().remove(0);

    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "text/plain".to_string());
    let request = Request {
        method: Method::Post,
        target: "/cgi-bin/hello.py?x=1&y=2".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: b"12345".to_vec(),
        chunked: false,
    };

    let env = cgi::build_env(&request, &config, "/var/www/cgi-bin/hello.py");
    assert_eq!(env.get("GATEWAY_INTERFACE").unwrap(), "CGI/1.1");
    assert_eq!(env.get("SERVER_PROTOCOL").unwrap(), "HTTP/1.1");
    assert_eq!(env.get("SERVER_NAME").unwrap(), "example");
    assert_eq!(env.get("SERVER_PORT").unwrap(), "8090");
    assert_eq!(env.get("REQUEST_METHOD").unwrap(), "POST");
    assert_eq!(env.get("SCRIPT_NAME").unwrap(), "/var/www/cgi-bin/hello.py");
    assert_eq!(env.get("PATH_INFO").unwrap(), "");
    assert_eq!(env.get("PATH_TRANSLATED").unwrap(), "/var/www/cgi-bin/hello.py");
    assert_eq!(env.get("QUERY_STRING").unwrap(), "x=1&y=2");
    assert_eq!(env.get("CONTENT_LENGTH").unwrap(), "5");
    assert_eq!(env.get("CONTENT_TYPE").unwrap(), "text/plain");
    assert!(env.contains_key("SERVER_SOFTWARE"));
}

#[test]
fn omits_optional_variables_when_absent() {
    let source = "server { listen 8090; root /var/www; }";
    let config = config::from_source(source).unwrap().remove(0);
    let request = Request {
        method: Method::Get,
        target: "/cgi-bin/hello.py".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: HashMap::new(),
        body: Vec::new(),
        chunked: false,
    };
    let env = cgi::build_env(&request, &config, "/var/www/cgi-bin/hello.py");
    assert!(!env.contains_key("QUERY_STRING"));
    assert!(!env.contains_key("CONTENT_LENGTH"));
    assert!(!env.contains_key("CONTENT_TYPE"));
}
