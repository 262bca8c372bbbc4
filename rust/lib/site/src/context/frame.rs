//! Mount frames.
//!
//! Each nested mount adds a frame holding its prefix. Frames are
//! immutable and shared by handle; a child points at its parent and at
//! its nearest top ancestor, resolved once when the child is built.

use std::sync::Arc;

use url::Url;

#[derive(Debug)]
pub struct Frame {
    parent: Option<Arc<Frame>>,
    /// Nearest ancestor flagged top, or the root. `None` on the root.
    top: Option<Arc<Frame>>,
    is_top: bool,
    prefix: String,
    static_url: String,
    /// Set on the root frame only.
    original_url: Option<Url>,
}

impl Frame {
    /// A root frame, flagged top.
    pub fn root(original_url: Option<Url>, prefix: &str, static_url: &str) -> Arc<Frame> {
        Arc::new(Frame {
            parent: None,
            top: None,
            is_top: true,
            prefix: prefix.trim_end_matches('/').to_string(),
            static_url: static_url.trim_end_matches('/').to_string(),
            original_url,
        })
    }

    /// A child mounted at `path` (already normalized to `/segment` or empty).
    pub fn child(self: &Arc<Self>, path: &str) -> Arc<Frame> {
        let static_url = if self.static_url == self.prefix {
            format!("{}{}", self.static_url, path)
        } else {
            self.static_url.clone()
        };
        Arc::new(Frame {
            parent: Some(self.clone()),
            top: Some(self.top()),
            is_top: false,
            prefix: format!("{}{}", self.prefix, path),
            static_url,
            original_url: None,
        })
    }

    /// Copy of this frame with a different top flag.
    pub fn with_top(&self, is_top: bool) -> Arc<Frame> {
        Arc::new(Frame {
            parent: self.parent.clone(),
            top: self.top.clone(),
            is_top,
            prefix: self.prefix.clone(),
            static_url: self.static_url.clone(),
            original_url: self.original_url.clone(),
        })
    }

    /// Copy of this frame with new prefixes.
    pub fn with_prefix(&self, prefix: &str, static_url: &str) -> Arc<Frame> {
        Arc::new(Frame {
            parent: self.parent.clone(),
            top: self.top.clone(),
            is_top: self.is_top,
            prefix: prefix.trim_end_matches('/').to_string(),
            static_url: static_url.trim_end_matches('/').to_string(),
            original_url: self.original_url.clone(),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Frame>> {
        self.parent.as_ref()
    }

    pub fn is_top(&self) -> bool {
        self.is_top
    }

    /// Nearest frame flagged top, starting at `self`; the root if none is.
    pub fn top(self: &Arc<Self>) -> Arc<Frame> {
        if self.is_top {
            return self.clone();
        }
        match &self.top {
            Some(top) => top.clone(),
            None => self.clone(),
        }
    }

    pub fn root_frame(self: &Arc<Self>) -> Arc<Frame> {
        let mut cur = self.clone();
        while let Some(parent) = cur.parent.clone() {
            cur = parent;
        }
        cur
    }

    /// URL of the request before any prefix was stripped.
    pub fn original_url(&self) -> Option<&Url> {
        let mut cur = self;
        loop {
            match &cur.parent {
                Some(parent) => cur = &**parent,
                None => return cur.original_url.as_ref(),
            }
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn static_url(&self) -> &str {
        &self.static_url
    }

    pub fn depth(&self) -> usize {
        let mut n = 0;
        let mut cur = self;
        while let Some(parent) = &cur.parent {
            n += 1;
            cur = &**parent;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_extends_prefix_and_static_url_when_equal() {
        let root = Frame::root(None, "/admin/", "/admin");
        assert_eq!(root.prefix(), "/admin");

        let child = root.child("/shop");
        assert_eq!(child.prefix(), "/admin/shop");
        assert_eq!(child.static_url(), "/admin/shop");
        assert_eq!(child.depth(), 1);

        let cdn = Frame::root(None, "/admin", "https://cdn.example.com");
        assert_eq!(cdn.child("/shop").static_url(), "https://cdn.example.com");
    }

    #[test]
    fn top_is_nearest_flagged_ancestor_or_root() {
        let url = Url::parse("https://example.com/admin/shop/orders").unwrap();
        let root = Frame::root(Some(url.clone()), "", "");
        let a = root.child("/admin");
        assert!(Arc::ptr_eq(&a.top(), &root));

        let a_top = a.with_top(true);
        let b = a_top.child("/shop");
        assert!(Arc::ptr_eq(&b.top(), &a_top));
        let c = b.child("/orders");
        assert!(Arc::ptr_eq(&c.top(), &a_top));

        assert_eq!(c.original_url(), Some(&url));
        assert!(Arc::ptr_eq(&c.root_frame(), &root));
    }

    #[test]
    fn untopped_root_is_its_own_top() {
        let root = Frame::root(None, "", "").with_top(false);
        let child = root.child("/x");
        assert!(Arc::ptr_eq(&child.top(), &root));
    }
}
