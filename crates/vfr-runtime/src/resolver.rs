//! The Request Resolver: URL → VFS path mapping, scope stripping, SPA
//! fallback, and the dev-proxy bypass decision (`spec.md` §4.2).
//!
//! Kept as pure functions of `(url, scope, flags)`, per the source's own
//! design note: resolution carries no state of its own, only the
//! `AppScope` and dev-proxy configuration handed in by the caller.

/// What the caller should do with a request, once resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Let the request fall through to the network unmodified.
    Bypass,
    /// Forward the request verbatim to `upstream_base`, with caching
    /// forcibly disabled on the reply.
    Proxy { upstream_base: String },
    /// Serve this VFS path from the engine.
    Vfs { path: String },
}

/// Request-scoped facts the resolver needs; everything else (AppScope,
/// dev-proxy config) is passed in explicitly.
#[derive(Clone, Debug)]
pub struct RequestContext<'a> {
    /// Raw request path, e.g. `/app/guide/intro`.
    pub path: &'a str,
    /// Raw query string, without the leading `?`.
    pub query: &'a str,
    /// Whether the request advertises a WebSocket upgrade.
    pub is_websocket_upgrade: bool,
    /// Whether the request's origin matches the runtime's own origin.
    pub same_origin: bool,
    /// The worker's registration scope prefix (e.g. `/sw-scope`), stripped
    /// before AppScope matching. Empty if the runtime is registered at `/`.
    pub registration_scope: &'a str,
}

/// Dev-proxy configuration, only consulted when `dev_proxy` is enabled.
#[derive(Clone, Debug)]
pub struct DevProxyConfig<'a> {
    pub upstream_base: &'a str,
    /// Prefixes treated as the dev toolchain's own traffic (module-graph
    /// entries, HMR endpoints) in addition to the scope's `src/` tree.
    pub tool_prefixes: &'a [&'a str],
}

/// Result of the root-navigation check: whether AppScope must be cleared
/// as a side effect of this resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    pub clear_scope: bool,
}

/// Resolve a request per `spec.md` §4.2's ordered rules. `scope` is the
/// current `AppScope`, if set.
#[must_use]
pub fn resolve(
    ctx: &RequestContext<'_>,
    scope: Option<&str>,
    dev_proxy: Option<&DevProxyConfig<'_>>,
) -> Resolution {
    let bypass = Resolution {
        decision: Decision::Bypass,
        clear_scope: false,
    };

    if ctx.is_websocket_upgrade {
        return bypass;
    }

    if (ctx.path.is_empty() || ctx.path == "/") && scope.is_some() {
        return Resolution {
            decision: Decision::Bypass,
            clear_scope: true,
        };
    }

    if !ctx.same_origin {
        return bypass;
    }

    let Some(scope) = scope else {
        return bypass;
    };

    // Every same-origin request is proxied in dev-proxy mode (spec.md
    // §4.2 rule 5); the tool-prefix/src-tree check matters only for the
    // response's cache-control overlay, applied by the caller.
    if let Some(proxy) = dev_proxy {
        return Resolution {
            decision: Decision::Proxy {
                upstream_base: proxy.upstream_base.to_owned(),
            },
            clear_scope: false,
        };
    }

    Resolution {
        decision: Decision::Vfs {
            path: vfs_path(ctx, scope),
        },
        clear_scope: false,
    }
}

/// Strip the worker's registration scope prefix, normalizing to a leading
/// slash.
fn strip_scope<'a>(path: &'a str, registration_scope: &str) -> &'a str {
    path.strip_prefix(registration_scope).unwrap_or(path)
}

/// Compute the VFS path per rule 6: strip registration scope, drop a
/// leading `AppScope` segment, default to `index.html`, prefix with the
/// VFS root and scope.
fn vfs_path(ctx: &RequestContext<'_>, scope: &str) -> String {
    let stripped = strip_scope(ctx.path, ctx.registration_scope);
    let trailing_slash = stripped.ends_with('/') || stripped.is_empty();

    let mut segments: Vec<&str> = stripped.split('/').filter(|s| !s.is_empty()).collect();
    if segments.first() == Some(&scope) {
        segments.remove(0);
    }

    let mut path = format!("/{scope}");
    for segment in &segments {
        path.push('/');
        path.push_str(segment);
    }
    if segments.is_empty() || trailing_slash {
        path.push_str("/index.html");
    }
    path
}

/// Whether `path` (the original request URL, before VFS resolution)
/// targets an HTML-like resource and should receive the SPA fallback on a
/// missing read (`spec.md` §4.2, invariant 5).
#[must_use]
pub fn looks_like_html_route(path: &str) -> bool {
    match path.rsplit('/').next() {
        Some(last) if last.contains('.') => {
            last.ends_with(".html") || last.ends_with(".htm")
        }
        _ => true,
    }
}

/// The SPA fallback target for `scope`, per `spec.md` §4.2/invariant 5.
#[must_use]
pub fn spa_fallback_path(scope: &str) -> String {
    format!("/{scope}/index.html")
}
