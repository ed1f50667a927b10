//! Listing of registered endpoints for the landing page.

/// A registered endpoint as shown on the index page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// Request path, including the leading `/`.
    pub path: &'static str,
    /// Link text.
    pub name: &'static str,
}

impl RouteDescriptor {
    /// Descriptor whose display name is the path without its leading `/`.
    #[must_use]
    pub fn from_path(path: &'static str) -> Self {
        Self { path, name: path.trim_start_matches('/') }
    }
}

/// Ordered set of endpoints to advertise. The index route itself is never
/// listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDirectory {
    routes: Vec<RouteDescriptor>,
}

impl RouteDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. The root path and duplicate paths are ignored.
    pub fn push(&mut self, route: RouteDescriptor) {
        if route.path == "/" || self.routes.iter().any(|r| r.path == route.path) {
            return;
        }
        self.routes.push(route);
    }

    #[must_use]
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    /// Render the index page, linking every route under `base_url`.
    #[must_use]
    pub fn render_html(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        let mut html = String::from(
            "<div>\n<table>\n  <tbody>\n    <tr>\n      <th>PostgreSql API Methods</th>\n    </tr>\n",
        );
        for route in &self.routes {
            let href = format!("{base}/{}", route.path.trim_start_matches('/'));
            html.push_str("    <tr>\n      <td><a target='_blank' href='");
            html.push_str(&escape_html(&href));
            html.push_str("'>");
            html.push_str(&escape_html(route.name));
            html.push_str("</a></td>\n    </tr>\n");
        }
        html.push_str("  </tbody>\n</table>\n</div>\n");
        html
    }
}

impl FromIterator<RouteDescriptor> for RouteDirectory {
    fn from_iter<I: IntoIterator<Item = RouteDescriptor>>(iter: I) -> Self {
        let mut directory = Self::new();
        for route in iter {
            directory.push(route);
        }
        directory
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
