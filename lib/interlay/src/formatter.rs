//! Log line rendering with credential redaction.
//!
//! [`MessageFormatter`] renders a request, its response (if any) and the
//! failure (if any) with one of two templates, then masks every configured
//! credential wherever it appears in the line.

use std::borrow::Cow;

use chrono::Utc;
use regex::{NoExpand, Regex};

use crate::{Error, Request, Response, Result};

/// Mask substituted for every credential occurrence.
pub const CREDENTIAL_REPLACEMENT: &str = "******";

/// Line layout selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Common-log style:
    /// `{host} {user-agent} - [{date}] "{METHOD} {target} HTTP/1.1" {status} {content-length}`.
    ///
    /// `{host}` is the host of the request URL, not the local machine name
    /// that Guzzle's CLF format prints, so lines from one process can be told
    /// apart by upstream.
    Compact,
    /// Full request and response messages, followed by the failure:
    /// `>>>>>>>>\n{request}\n<<<<<<<<\n{response}\n--------\n{error}`.
    Debug,
}

/// Renders log lines and masks credentials in them.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    template: Template,
    redactor: Option<Regex>,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self {
            template: Template::Compact,
            redactor: None,
        }
    }
}

impl MessageFormatter {
    /// Build a formatter masking `credentials`, with the debug template when
    /// `debug` is set.
    ///
    /// Empty credentials are ignored. At any position the longest matching
    /// credential wins, and replaced text is never scanned again.
    pub fn new<I, S>(credentials: I, debug: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut literals: Vec<String> = credentials
            .into_iter()
            .map(|credential| credential.as_ref().to_string())
            .filter(|credential| !credential.is_empty())
            .collect();
        literals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        literals.dedup();

        let redactor = if literals.is_empty() {
            None
        } else {
            let pattern = literals
                .iter()
                .map(|literal| regex::escape(literal))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&pattern)
                .map_err(|err| Error::configuration(format!("credential table: {err}")))?;
            Some(regex)
        };

        let template = if debug {
            Template::Debug
        } else {
            Template::Compact
        };

        Ok(Self { template, redactor })
    }

    /// Template in use.
    #[must_use]
    pub const fn template(&self) -> Template {
        self.template
    }

    /// Render and redact a line.
    #[must_use]
    pub fn format(
        &self,
        request: &Request,
        response: Option<&Response>,
        error: Option<&Error>,
    ) -> String {
        let line = match self.template {
            Template::Compact => render_compact(request, response),
            Template::Debug => render_debug(request, response, error),
        };
        self.redact(&line).into_owned()
    }

    /// Mask every credential occurrence in `text`.
    #[must_use]
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.redactor {
            Some(regex) => regex.replace_all(text, NoExpand(CREDENTIAL_REPLACEMENT)),
            None => Cow::Borrowed(text),
        }
    }
}

fn request_target(request: &Request) -> String {
    let url = request.url();
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

fn render_compact(request: &Request, response: Option<&Response>) -> String {
    let host = request.url().host_str().unwrap_or_default();
    let user_agent = request.headers().line("User-Agent").unwrap_or_default();
    let date = Utc::now().format("%d/%b/%Y:%H:%M:%S %z");
    let (status, length) = match response {
        Some(response) => (
            response.status().to_string(),
            response.headers().line("Content-Length").unwrap_or_default(),
        ),
        None => ("NULL".to_string(), "NULL".to_string()),
    };

    format!(
        "{host} {user_agent} - [{date}] \"{method} {target} HTTP/{version}\" {status} {length}",
        method = request.method(),
        target = request_target(request),
        version = interlay_core::DEFAULT_VERSION,
    )
}

fn push_headers<'a>(out: &mut String, headers: impl Iterator<Item = (&'a str, &'a [String])>) {
    for (name, values) in headers {
        out.push('\n');
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&values.join(", "));
    }
}

fn request_message(request: &Request) -> String {
    let mut out = format!(
        "{} {} HTTP/{}",
        request.method(),
        request_target(request),
        interlay_core::DEFAULT_VERSION
    );
    if !request.headers().contains("Host") {
        out.push_str("\nHost: ");
        out.push_str(request.url().host_str().unwrap_or_default());
    }
    push_headers(&mut out, request.headers().iter());
    out.push_str("\n\n");
    out.push_str(&String::from_utf8_lossy(request.body()));
    out
}

fn response_message(response: &Response) -> String {
    let mut out = format!(
        "HTTP/{} {} {}",
        response.version(),
        response.status(),
        response.reason()
    );
    push_headers(&mut out, response.headers().iter());
    out.push_str("\n\n");
    out.push_str(&String::from_utf8_lossy(response.body()));
    out
}

fn render_debug(request: &Request, response: Option<&Response>, error: Option<&Error>) -> String {
    let response = response.map(response_message).unwrap_or_default();
    let error = error.map_or_else(|| "NULL".to_string(), ToString::to_string);

    format!(
        ">>>>>>>>\n{request}\n<<<<<<<<\n{response}\n--------\n{error}",
        request = request_message(request),
    )
}
