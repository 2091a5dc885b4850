use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use url::Url;

use super::{ContentError, ContentSource, ObjectKind, ObjectRef, Post, Taxonomy, Term, User};

/// TOML document describing a content snapshot.
///
/// ```toml
/// site_url = "https://example.com"
///
/// [[taxonomies]]
/// name = "category"
/// hierarchical = true
/// post_types = ["post"]
///
/// [[posts]]
/// id = 42
/// author_id = 7
/// slug = "hello-world"
/// terms = [3]
///
/// [[terms]]
/// id = 3
/// taxonomy = "category"
/// slug = "news"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentFixture {
    pub site_url: Option<String>,
    pub taxonomies: Vec<Taxonomy>,
    pub posts: Vec<Post>,
    pub terms: Vec<Term>,
    pub users: Vec<User>,
}

/// [`ContentSource`] over an in-memory snapshot.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContent {
    site_url: Option<Url>,
    taxonomies: Vec<Taxonomy>,
    posts: BTreeMap<u64, Post>,
    terms: BTreeMap<u64, Term>,
    users: BTreeMap<u64, User>,
}

impl InMemoryContent {
    pub fn from_fixture(fixture: ContentFixture) -> Result<Self, ContentError> {
        let site_url = fixture
            .site_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(parse_site_url)
            .transpose()?;

        let mut content = Self {
            site_url,
            taxonomies: fixture.taxonomies,
            ..Self::default()
        };

        for post in fixture.posts {
            let id = post.id;
            if content.posts.insert(id, post).is_some() {
                return Err(ContentError::Invalid(format!("duplicate post id {id}")));
            }
        }
        for term in fixture.terms {
            let id = term.id;
            if content.terms.insert(id, term).is_some() {
                return Err(ContentError::Invalid(format!("duplicate term id {id}")));
            }
        }
        for user in fixture.users {
            let id = user.id;
            if content.users.insert(id, user).is_some() {
                return Err(ContentError::Invalid(format!("duplicate user id {id}")));
            }
        }

        Ok(content)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ContentError> {
        let fixture: ContentFixture = toml::from_str(input)?;
        Self::from_fixture(fixture)
    }

    pub fn from_path(path: &Path) -> Result<Self, ContentError> {
        let input = std::fs::read_to_string(path).map_err(|source| ContentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Replace the site URL used to derive permalinks.
    pub fn with_site_url(mut self, site_url: Url) -> Self {
        self.site_url = Some(with_trailing_slash(site_url));
        self
    }

    pub fn insert_post(&mut self, post: Post) {
        self.posts.insert(post.id, post);
    }

    pub fn insert_term(&mut self, term: Term) {
        self.terms.insert(term.id, term);
    }

    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn register_taxonomy(&mut self, taxonomy: Taxonomy) {
        self.taxonomies.retain(|existing| existing.name != taxonomy.name);
        self.taxonomies.push(taxonomy);
    }

    fn is_flat(&self, taxonomy: &str) -> bool {
        self.taxonomies
            .iter()
            .find(|candidate| candidate.name == taxonomy)
            .is_some_and(|registered| !registered.hierarchical)
    }

    fn site_link(&self, path: &str) -> Option<String> {
        let base = self.site_url.as_ref()?;
        base.join(path).ok().map(String::from)
    }
}

impl ContentSource for InMemoryContent {
    fn post(&self, id: u64) -> Option<Post> {
        self.posts.get(&id).cloned()
    }

    fn term(&self, id: u64, taxonomy: Option<&str>) -> Option<Term> {
        self.terms
            .get(&id)
            .filter(|term| taxonomy.is_none_or(|wanted| term.taxonomy == wanted))
            .cloned()
    }

    fn user(&self, id: u64) -> Option<User> {
        self.users.get(&id).cloned()
    }

    fn taxonomies_for(&self, post_type: &str) -> Vec<String> {
        self.taxonomies
            .iter()
            .filter(|taxonomy| taxonomy.post_types.iter().any(|ty| ty == post_type))
            .map(|taxonomy| taxonomy.name.clone())
            .collect()
    }

    fn post_terms(&self, post_id: u64, taxonomy: &str) -> Vec<Term> {
        let Some(post) = self.posts.get(&post_id) else {
            return Vec::new();
        };
        post.terms
            .iter()
            .filter_map(|id| self.terms.get(id))
            .filter(|term| term.taxonomy == taxonomy)
            .cloned()
            .collect()
    }

    fn posts_with_term(
        &self,
        term: &Term,
        post_types: &[String],
        statuses: &[String],
    ) -> Vec<Post> {
        self.posts
            .values()
            .filter(|post| post.terms.contains(&term.id))
            .filter(|post| post_types.contains(&post.post_type))
            .filter(|post| statuses.contains(&post.status))
            .cloned()
            .collect()
    }

    fn posts_by_author(&self, user_id: u64, post_types: &[String], statuses: &[String]) -> Vec<Post> {
        self.posts
            .values()
            .filter(|post| post.author_id == user_id)
            .filter(|post| post_types.contains(&post.post_type))
            .filter(|post| statuses.contains(&post.status))
            .cloned()
            .collect()
    }

    fn term_ancestors(&self, term: &Term) -> Vec<Term> {
        if self.is_flat(&term.taxonomy) {
            return Vec::new();
        }

        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([term.id]);
        let mut next = term.parent_id;
        while let Some(parent_id) = next {
            if !seen.insert(parent_id) {
                break;
            }
            let Some(parent) = self.terms.get(&parent_id) else {
                break;
            };
            if parent.taxonomy != term.taxonomy {
                break;
            }
            next = parent.parent_id;
            ancestors.push(parent.clone());
        }
        ancestors
    }

    fn post_ancestors(&self, post: &Post) -> Vec<Post> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([post.id]);
        let mut next = post.parent_id;
        while let Some(parent_id) = next {
            if parent_id == 0 || !seen.insert(parent_id) {
                break;
            }
            let Some(parent) = self.posts.get(&parent_id) else {
                break;
            };
            next = parent.parent_id;
            ancestors.push(parent.clone());
        }
        ancestors
    }

    fn permalink(&self, object: ObjectRef) -> Option<String> {
        match object.kind {
            ObjectKind::Post => {
                let post = self.posts.get(&object.id)?;
                post.permalink.clone().or_else(|| {
                    let path = if post.post_type == "post" || post.post_type == "page" {
                        format!("{}/", post.slug)
                    } else {
                        format!("{}/{}/", post.post_type, post.slug)
                    };
                    self.site_link(&path)
                })
            }
            ObjectKind::Term => {
                let term = self.terms.get(&object.id)?;
                term.permalink
                    .clone()
                    .or_else(|| self.site_link(&format!("{}/{}/", term.taxonomy, term.slug)))
            }
            ObjectKind::User => {
                let user = self.users.get(&object.id)?;
                user.permalink
                    .clone()
                    .or_else(|| self.site_link(&format!("author/{}/", user.slug)))
            }
        }
    }

    fn home_url(&self) -> Option<String> {
        self.site_url.as_ref().map(Url::to_string)
    }
}

fn parse_site_url(value: &str) -> Result<Url, ContentError> {
    Url::parse(value)
        .map(with_trailing_slash)
        .map_err(|err| ContentError::Invalid(format!("site_url `{value}`: {err}")))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
