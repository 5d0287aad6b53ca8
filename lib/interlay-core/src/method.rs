//! HTTP method types.

use std::str::FromStr;

use derive_more::Display;

/// HTTP request method.
///
/// Covers the standard verbs, cache `PURGE`, and the WebDAV extensions from
/// RFC 4918 and RFC 4437 (redirect references).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Method {
    /// GET method - retrieve a resource.
    #[display("GET")]
    Get,
    /// POST method - create a resource.
    #[display("POST")]
    Post,
    /// PUT method - replace a resource.
    #[display("PUT")]
    Put,
    /// DELETE method - remove a resource.
    #[display("DELETE")]
    Delete,
    /// PATCH method - partially update a resource.
    #[display("PATCH")]
    Patch,
    /// HEAD method - retrieve headers only.
    #[display("HEAD")]
    Head,
    /// OPTIONS method - retrieve allowed methods.
    #[display("OPTIONS")]
    Options,
    /// TRACE method - loop the request back.
    #[display("TRACE")]
    Trace,
    /// CONNECT method - open a tunnel.
    #[display("CONNECT")]
    Connect,
    /// PURGE - evict a resource from an intermediary cache.
    #[display("PURGE")]
    Purge,
    /// WebDAV PROPFIND - retrieve resource properties.
    #[display("PROPFIND")]
    PropFind,
    /// WebDAV PROPPATCH - update resource properties.
    #[display("PROPPATCH")]
    PropPatch,
    /// WebDAV MKCOL - create a collection.
    #[display("MKCOL")]
    MkCol,
    /// WebDAV COPY - copy a resource.
    #[display("COPY")]
    Copy,
    /// WebDAV MOVE - move a resource.
    #[display("MOVE")]
    Move,
    /// WebDAV LOCK - lock a resource.
    #[display("LOCK")]
    Lock,
    /// WebDAV UNLOCK - release a lock.
    #[display("UNLOCK")]
    Unlock,
    /// WebDAV MKREDIRECTREF - create a redirect reference.
    #[display("MKREDIRECTREF")]
    MkRedirectRef,
    /// WebDAV UPDATEREDIRECTREF - retarget a redirect reference.
    #[display("UPDATEREDIRECTREF")]
    UpdateRedirectRef,
}

impl Method {
    /// Canonical upper-case token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Purge => "PURGE",
            Self::PropFind => "PROPFIND",
            Self::PropPatch => "PROPPATCH",
            Self::MkCol => "MKCOL",
            Self::Copy => "COPY",
            Self::Move => "MOVE",
            Self::Lock => "LOCK",
            Self::Unlock => "UNLOCK",
            Self::MkRedirectRef => "MKREDIRECTREF",
            Self::UpdateRedirectRef => "UPDATEREDIRECTREF",
        }
    }

    /// Returns `true` if the method is safe (does not modify resources).
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        matches!(
            self,
            Self::Get | Self::Head | Self::Options | Self::Trace | Self::PropFind
        )
    }

    /// Returns `true` if the method is idempotent.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        !matches!(
            self,
            Self::Post | Self::Patch | Self::Connect | Self::Lock | Self::MkRedirectRef
        )
    }
}

impl FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "TRACE" => Self::Trace,
            "CONNECT" => Self::Connect,
            "PURGE" => Self::Purge,
            "PROPFIND" => Self::PropFind,
            "PROPPATCH" => Self::PropPatch,
            "MKCOL" => Self::MkCol,
            "COPY" => Self::Copy,
            "MOVE" => Self::Move,
            "LOCK" => Self::Lock,
            "UNLOCK" => Self::Unlock,
            "MKREDIRECTREF" => Self::MkRedirectRef,
            "UPDATEREDIRECTREF" => Self::UpdateRedirectRef,
            other => {
                return Err(crate::Error::InvalidRequest(format!(
                    "unsupported HTTP method: {other}"
                )));
            }
        };
        Ok(method)
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = crate::Error;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}
