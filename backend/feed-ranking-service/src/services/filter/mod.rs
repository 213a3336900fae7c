use crate::models::{CandidatePost, ScoredPost};
use crate::utils::strip_markup;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Viewer-selected content facet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    /// Lightweight posts without a primary image.
    Stories,
    /// Posts with a primary image.
    Media,
    /// Posts carrying this tag, compared case-insensitively. Stored lowercased.
    Tag(String),
}

impl CategoryFilter {
    pub fn tag(tag: &str) -> Self {
        CategoryFilter::Tag(tag.trim().trim_start_matches('#').to_lowercase())
    }

    pub fn matches(&self, post: &CandidatePost) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Stories => !post.has_image,
            CategoryFilter::Media => post.has_image,
            CategoryFilter::Tag(tag) => post.tag_list.iter().any(|t| t.to_lowercase() == *tag),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_lowercase().as_str() {
            "" | "all" => CategoryFilter::All,
            "stories" | "story" => CategoryFilter::Stories,
            "media" => CategoryFilter::Media,
            _ => match trimmed.split_once(':') {
                Some((prefix, tag)) if prefix.eq_ignore_ascii_case("tag") => {
                    CategoryFilter::tag(tag)
                }
                _ => CategoryFilter::tag(trimmed),
            },
        })
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("all"),
            CategoryFilter::Stories => f.write_str("stories"),
            CategoryFilter::Media => f.write_str("media"),
            CategoryFilter::Tag(tag) => write!(f, "tag:{tag}"),
        }
    }
}

/// Free-text query. Every term must appear in the title, the plain-text
/// body or the author name; an empty query matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        Self {
            terms: query.split_whitespace().map(str::to_lowercase).collect(),
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, post: &CandidatePost) -> bool {
        if self.terms.is_empty() {
            return true;
        }

        let fields = [
            post.title.to_lowercase(),
            strip_markup(&post.body).to_lowercase(),
            post.author_name.to_lowercase(),
        ];

        self.terms
            .iter()
            .all(|term| fields.iter().any(|field| field.contains(term.as_str())))
    }
}

/// Category facet followed by the text query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedFilter {
    pub category: CategoryFilter,
    pub query: SearchQuery,
}

impl FeedFilter {
    pub fn new(category: CategoryFilter, query: &str) -> Self {
        Self {
            category,
            query: SearchQuery::parse(query),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.category == CategoryFilter::All && self.query.is_empty()
    }

    pub fn matches(&self, post: &CandidatePost) -> bool {
        self.category.matches(post) && self.query.matches(post)
    }

    /// Keep matching posts, preserving their relative order.
    pub fn apply(&self, posts: Vec<ScoredPost>) -> Vec<ScoredPost> {
        if self.is_unfiltered() {
            return posts;
        }
        posts.into_iter().filter(|p| self.matches(&p.post)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FollowSet;
    use crate::services::ranking::FeedRanker;
    use chrono::{Duration, TimeZone, Utc};

    fn post(id: &str, title: &str, tags: &[&str], has_image: bool) -> CandidatePost {
        CandidatePost {
            id: id.to_string(),
            author_id: Some(format!("author-{id}")),
            author_name: format!("Author {id}"),
            title: title.to_string(),
            body: format!("<p>Body of {id}</p>"),
            tag_list: tags.iter().map(|t| t.to_string()).collect(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            like_count: 0,
            comment_count: 0,
            has_image,
        }
    }

    fn ranked(posts: Vec<CandidatePost>) -> Vec<ScoredPost> {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(1);
        FeedRanker::default().rank_candidates(&posts, &FollowSet::empty(), now)
    }

    fn ids(posts: &[ScoredPost]) -> Vec<&str> {
        posts.iter().map(|p| p.id()).collect()
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("all".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        assert_eq!("".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        assert_eq!("Stories".parse::<CategoryFilter>().unwrap(), CategoryFilter::Stories);
        assert_eq!("media".parse::<CategoryFilter>().unwrap(), CategoryFilter::Media);
        assert_eq!(
            "tag:News".parse::<CategoryFilter>().unwrap(),
            CategoryFilter::Tag("news".to_string())
        );
        assert_eq!(
            "#Rust".parse::<CategoryFilter>().unwrap(),
            CategoryFilter::Tag("rust".to_string())
        );
        assert_eq!(CategoryFilter::tag("News").to_string(), "tag:news");
    }

    #[test]
    fn test_category_matches() {
        let story = post("1", "t", &["News"], false);
        let photo = post("2", "t", &[], true);

        assert!(CategoryFilter::Stories.matches(&story));
        assert!(!CategoryFilter::Stories.matches(&photo));
        assert!(CategoryFilter::Media.matches(&photo));
        assert!(CategoryFilter::tag("news").matches(&story));
        assert!(!CategoryFilter::tag("news").matches(&photo));
    }

    #[test]
    fn test_search_requires_every_term() {
        let candidate = post("1", "Learning React", &[], false);

        assert!(SearchQuery::parse("react").matches(&candidate));
        assert!(SearchQuery::parse("LEARNING react").matches(&candidate));
        assert!(SearchQuery::parse("react author").matches(&candidate));
        assert!(SearchQuery::parse("body").matches(&candidate));
        assert!(!SearchQuery::parse("react vue").matches(&candidate));
        assert!(SearchQuery::parse("   ").matches(&candidate));
    }

    #[test]
    fn test_search_ignores_markup() {
        let candidate = post("1", "Plain", &[], false);
        assert!(!SearchQuery::parse("<p>").matches(&candidate));
    }

    #[test]
    fn test_filter_composition() {
        let posts = ranked(vec![
            post("1", "Learning React", &["news"], false),
            post("2", "Learning React", &["howto"], false),
            post("3", "Rust weekly", &["news"], true),
            post("4", "Gardening", &[], false),
            post("5", "Cooking", &["food"], true),
        ]);

        let news_react = FeedFilter::new(CategoryFilter::tag("news"), "react").apply(posts.clone());
        assert_eq!(ids(&news_react), vec!["1"]);

        let all_react = FeedFilter::new(CategoryFilter::All, "react").apply(posts.clone());
        assert_eq!(ids(&all_react), vec!["1", "2"]);

        let unfiltered = FeedFilter::default().apply(posts.clone());
        assert_eq!(unfiltered, posts);
    }

    #[test]
    fn test_filter_preserves_ranked_order() {
        let posts = ranked(vec![
            post("b", "news two", &["news"], false),
            post("a", "news one", &["news"], false),
            post("c", "other", &[], false),
        ]);

        let filtered = FeedFilter::new(CategoryFilter::tag("news"), "").apply(posts);
        assert_eq!(ids(&filtered), vec!["a", "b"]);
    }
}
