use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::matcher::match_location;
use crate::config::{Config, Location, ReturnDirective};
use crate::handlers::cgi::{self, CgiStatus};
use crate::http::request::Request;
use crate::http::response::{mime_type, status_text, Response};

/// Assembles a response for a parsed request against one server's
/// configuration and filesystem. Every failure path funnels through
/// [`ResponseBuilder::error`] so configured error pages apply uniformly.
pub struct ResponseBuilder<'a> {
    config: &'a Config,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn respond(&self, request: &Request) -> Response {
        let path = request.path();
        if path.contains("..") {
            return self.error(400);
        }

        let location = match match_location(self.config, path) {
            Some(location) => location,
            None => return self.error(404),
        };

        match location.return_directive() {
            ReturnDirective::Redirect { code, url } => {
                return Response::Redirect {
                    code: *code,
                    location: url.clone(),
                }
            }
            ReturnDirective::Response { code, body } => {
                return Response::Canned {
                    code: *code,
                    body: body.clone().unwrap_or_default().into_bytes(),
                }
            }
            ReturnDirective::None => {}
        }

        if !location.allows(request.method) {
            return self.error(405);
        }

        let candidate = self.candidate_path(location, path);

        if location.cgi().is_enabled() {
            if let Some(ext) = extension_of(path) {
                if location.cgi().handles_extension(ext) {
                    return self.run_cgi(location, request, &candidate, ext);
                }
            }
        }

        self.serve_filesystem(location, request, &candidate)
    }

    /// Error response for a status code: the configured page when it can
    /// be read, the built-in body otherwise.
    pub fn error(&self, code: u16) -> Response {
        if let Some(page) = self.config.error_pages().get(&code) {
            let path = format!("{}{}", self.config.root(), page);
            match fs::read(&path) {
                Ok(body) => return Response::ErrorPage { code, body },
                Err(err) => {
                    warn!("error page {} unreadable: {}", path, err);
                }
            }
        }
        Response::ErrorPage {
            code,
            body: built_in_error_body(code),
        }
    }

    fn candidate_path(&self, location: &Location, path: &str) -> PathBuf {
        PathBuf::from(format!(
            "{}{}{}",
            self.config.root(),
            location.root().unwrap_or(""),
            path
        ))
    }

    fn serve_filesystem(
        &self,
        location: &Location,
        request: &Request,
        candidate: &Path,
    ) -> Response {
        let meta = match fs::metadata(candidate) {
            Ok(meta) => meta,
            Err(err) => return self.error(fs_error_status(&err)),
        };

        if meta.is_dir() {
            let index = location.index().unwrap_or(self.config.index());
            let index_path = candidate.join(index);
            match open_regular(&index_path) {
                Ok((file, size)) => {
                    return static_file(file, &index_path, size, request.chunked)
                }
                Err(err) => {
                    if location.autoindex() {
                        return self.autoindex_page(candidate);
                    }
                    return self.error(fs_error_status(&err));
                }
            }
        }

        match open_regular(candidate) {
            Ok((file, size)) => static_file(file, candidate, size, request.chunked),
            Err(err) => self.error(fs_error_status(&err)),
        }
    }

    fn run_cgi(
        &self,
        location: &Location,
        request: &Request,
        script: &Path,
        ext: &str,
    ) -> Response {
        if !script.is_file() {
            return self.error(404);
        }
        let interpreter = match location.cgi().interpreter_for(ext) {
            Some(interpreter) => interpreter,
            None => {
                warn!("no interpreter bound for extension {:?}", ext);
                return self.error(500);
            }
        };

        let script_str = script.to_string_lossy();
        let env = cgi::build_env(request, self.config, &script_str);
        match cgi::execute(interpreter, script, &request.body, env) {
            Ok(outcome) => match outcome.status {
                CgiStatus::Success(0) => Response::CgiOutput {
                    bytes: outcome.stdout,
                },
                CgiStatus::Success(code) => {
                    warn!("cgi script {:?} exited with status {}", script, code);
                    self.error(500)
                }
                CgiStatus::Timeout => {
                    warn!("cgi script {:?} killed after deadline", script);
                    self.error(500)
                }
                CgiStatus::KilledBySignal | CgiStatus::Error => {
                    warn!("cgi script {:?} died abnormally", script);
                    self.error(500)
                }
            },
            Err(err) => {
                warn!("cgi execution failed: {}", err);
                self.error(500)
            }
        }
    }

    fn autoindex_page(&self, dir: &Path) -> Response {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("autoindex failed for {:?}: {}", dir, err);
                return self.error(500);
            }
        };

        let mut html = format!(
            "<!DOCTYPE html><html><body><h1>Directory Listing for {}</h1><ul>",
            dir.display()
        );
        for entry in entries.flatten() {
            html.push_str("<li>");
            html.push_str(&entry.file_name().to_string_lossy());
            html.push_str("</li>");
        }
        html.push_str("</ul></body></html>");
        Response::Directory { html }
    }
}

fn static_file(file: File, path: &Path, size: u64, request_chunked: bool) -> Response {
    Response::StaticFile {
        file,
        content_type: mime_type(&path.to_string_lossy()),
        size,
        chunked: request_chunked,
    }
}

fn open_regular(path: &Path) -> std::io::Result<(File, u64)> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(std::io::Error::new(ErrorKind::NotFound, "not a regular file"));
    }
    Ok((file, meta.len()))
}

fn fs_error_status(err: &std::io::Error) -> u16 {
    match err.kind() {
        ErrorKind::NotFound => 404,
        ErrorKind::PermissionDenied => 403,
        _ => 500,
    }
}

/// Extension including the dot, taken from the final path segment.
fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').map(|dot| &name[dot..])
}

fn built_in_error_body(code: u16) -> Vec<u8> {
    format!(
        "<html><body><h1>{} {}</h1></body></html>",
        code,
        status_text(code)
    )
    .into_bytes()
}
