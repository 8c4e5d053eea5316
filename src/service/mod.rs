//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services describe their writes as store batches and never talk to the
//! backend directly.

mod follow;
mod post;
mod profile;

pub use follow::{CounterAudit, FollowChange, FollowGraphService, Relationship};
pub use post::{NewPost, PostService};
pub use profile::{NewProfile, ProfileService, normalize_username};

const DEFAULT_PAGE_SIZE: usize = 20;

/// Requested page size, bounded by the configured maximum.
fn clamp_limit(requested: Option<usize>, max_page_size: usize) -> usize {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, max_page_size.max(1))
}

fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_applies_default_and_bounds() {
        assert_eq!(clamp_limit(None, 100), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_limit(Some(0), 100), 1);
        assert_eq!(clamp_limit(Some(500), 100), 100);
        assert_eq!(clamp_limit(None, 5), 5);
    }

    #[test]
    fn optional_text_is_trimmed_to_none() {
        assert_eq!(normalize_optional_text(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional_text(Some(" Kyoto ".to_string())),
            Some("Kyoto".to_string())
        );
    }
}
