//! Source material for post generation.
//!
//! The library is a directory of JSON files, one per author:
//!
//! ```json
//! {"author": "@someone", "posts": ["first post", "second post"]}
//! ```
//!
//! plus an optional `lore.json` holding `[{"topic": "...", "content": "..."}]`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::content::effects::{EffectOdds, StyleEffects};
use crate::error::ContentError;

/// A post offered as blending material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePost {
    pub author: String,
    pub text: String,
}

/// A piece of background lore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lore {
    pub topic: String,
    pub content: String,
}

/// Supplies randomized inputs to the content generator.
pub trait ContentSource: Send + Sync {
    /// Up to `n` posts, from distinct authors where possible.
    fn pick_candidate_posts(&self, n: usize) -> Vec<CandidatePost>;

    fn pick_style_effects(&self) -> StyleEffects;

    fn pick_background_lore(&self) -> Option<Lore>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthorFile {
    author: String,
    #[serde(default)]
    posts: Vec<String>,
}

/// Write `posts` as the library file for `handle` in `content_dir`,
/// replacing any earlier export for the same handle.
pub fn write_author_file(
    content_dir: &Path,
    handle: &str,
    posts: &[String],
) -> Result<PathBuf, ContentError> {
    let path = content_dir.join(format!("{}.json", handle));
    let load_error = |reason: String| ContentError::Load {
        path: path.clone(),
        reason,
    };

    std::fs::create_dir_all(content_dir).map_err(|e| load_error(e.to_string()))?;
    let file = AuthorFile {
        author: format!("@{}", handle),
        posts: posts.to_vec(),
    };
    let body = serde_json::to_string_pretty(&file).map_err(|e| load_error(e.to_string()))?;
    std::fs::write(&path, body).map_err(|e| load_error(e.to_string()))?;
    Ok(path)
}

/// File-backed [`ContentSource`].
#[derive(Debug, Default)]
pub struct ContentLibrary {
    authors: Vec<AuthorFile>,
    lore: Vec<Lore>,
    odds: EffectOdds,
    /// Seeded generator for tests; thread-local randomness otherwise.
    seeded: Option<Mutex<rand::rngs::StdRng>>,
}

impl ContentLibrary {
    /// Load every `*.json` file in `content_dir`, and `lore_path` if present.
    pub fn load(content_dir: &Path, lore_path: Option<&Path>) -> Result<Self, ContentError> {
        let entries = std::fs::read_dir(content_dir).map_err(|e| ContentError::Load {
            path: content_dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut authors = Vec::new();
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|e| ContentError::Load {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            match serde_json::from_str::<AuthorFile>(&raw) {
                Ok(file) if !file.posts.is_empty() => authors.push(file),
                Ok(_) => tracing::debug!("Skipping empty content file {}", path.display()),
                Err(e) => tracing::warn!("Skipping malformed content file {}: {}", path.display(), e),
            }
        }

        let lore = match lore_path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path).map_err(|e| ContentError::Load {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                serde_json::from_str(&raw).map_err(|e| ContentError::Load {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
            _ => Vec::new(),
        };

        tracing::info!(
            "Loaded content library: {} authors, {} posts, {} lore entries",
            authors.len(),
            authors.iter().map(|a| a.posts.len()).sum::<usize>(),
            lore.len()
        );

        Ok(Self {
            authors,
            lore,
            ..Self::default()
        })
    }

    /// Build a library from in-memory material.
    pub fn from_posts(posts: Vec<CandidatePost>, lore: Vec<Lore>) -> Self {
        let mut authors: Vec<AuthorFile> = Vec::new();
        for post in posts {
            match authors.iter_mut().find(|a| a.author == post.author) {
                Some(existing) => existing.posts.push(post.text),
                None => authors.push(AuthorFile {
                    author: post.author,
                    posts: vec![post.text],
                }),
            }
        }
        Self {
            authors,
            lore,
            ..Self::default()
        }
    }

    pub fn with_odds(mut self, odds: EffectOdds) -> Self {
        self.odds = odds;
        self
    }

    /// Use a deterministic generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        use rand::SeedableRng;
        self.seeded = Some(Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)));
        self
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }

    pub fn post_count(&self) -> usize {
        self.authors.iter().map(|a| a.posts.len()).sum()
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn rand::RngCore) -> T) -> T {
        if let Some(seeded) = &self.seeded
            && let Ok(mut rng) = seeded.lock()
        {
            return f(&mut *rng);
        }
        f(&mut rand::thread_rng())
    }

    fn pick_posts(&self, n: usize, rng: &mut dyn rand::RngCore) -> Vec<CandidatePost> {
        let mut picked: Vec<CandidatePost> = self
            .authors
            .choose_multiple(rng, n)
            .filter_map(|author| {
                author.posts.choose(rng).map(|text| CandidatePost {
                    author: author.author.clone(),
                    text: text.clone(),
                })
            })
            .collect();

        // Fewer authors than requested: top up from the whole pool without
        // repeating a post.
        if picked.len() < n {
            let mut pool: Vec<CandidatePost> = self
                .authors
                .iter()
                .flat_map(|a| {
                    a.posts.iter().map(|text| CandidatePost {
                        author: a.author.clone(),
                        text: text.clone(),
                    })
                })
                .filter(|post| !picked.contains(post))
                .collect();
            pool.shuffle(rng);
            picked.extend(pool.into_iter().take(n - picked.len()));
        }

        picked
    }
}

impl ContentSource for ContentLibrary {
    fn pick_candidate_posts(&self, n: usize) -> Vec<CandidatePost> {
        self.with_rng(|rng| self.pick_posts(n, rng))
    }

    fn pick_style_effects(&self) -> StyleEffects {
        self.with_rng(|rng| self.odds.pick(rng))
    }

    fn pick_background_lore(&self) -> Option<Lore> {
        self.with_rng(|rng| self.lore.choose(rng).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn post(author: &str, text: &str) -> CandidatePost {
        CandidatePost {
            author: author.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_written_author_file_loads_back() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("content");
        let posts = vec!["gm".to_string(), "wagmi".to_string()];

        let path = write_author_file(&content, "dave", &posts).unwrap();
        assert_eq!(path, content.join("dave.json"));

        let library = ContentLibrary::load(&content, None).unwrap();
        assert_eq!(library.author_count(), 1);
        let picked = library.pick_candidate_posts(1);
        assert_eq!(picked[0].author, "@dave");
        assert!(posts.contains(&picked[0].text));
    }

    #[test]
    fn test_distinct_authors_when_possible() {
        let library = ContentLibrary::from_posts(
            vec![
                post("a", "a1"),
                post("a", "a2"),
                post("b", "b1"),
                post("c", "c1"),
                post("d", "d1"),
            ],
            Vec::new(),
        )
        .with_seed(11);

        for _ in 0..20 {
            let picked = library.pick_candidate_posts(3);
            assert_eq!(picked.len(), 3);
            let authors: HashSet<_> = picked.iter().map(|p| p.author.clone()).collect();
            assert_eq!(authors.len(), 3);
        }
    }

    #[test]
    fn test_tops_up_from_single_author() {
        let library =
            ContentLibrary::from_posts(vec![post("a", "one"), post("a", "two"), post("a", "three")], Vec::new())
                .with_seed(5);
        let picked = library.pick_candidate_posts(3);
        assert_eq!(picked.len(), 3);
        let texts: HashSet<_> = picked.iter().map(|p| p.text.clone()).collect();
        assert_eq!(texts.len(), 3);
    }

    #[test]
    fn test_small_library_returns_what_it_has() {
        let library = ContentLibrary::from_posts(vec![post("a", "only")], Vec::new());
        assert_eq!(library.pick_candidate_posts(3).len(), 1);
        assert!(ContentLibrary::default().pick_candidate_posts(2).is_empty());
    }

    #[test]
    fn test_lore_pick() {
        let empty = ContentLibrary::default();
        assert!(empty.pick_background_lore().is_none());

        let library = ContentLibrary::from_posts(
            Vec::new(),
            vec![Lore {
                topic: "origin".to_string(),
                content: "born in a datacenter".to_string(),
            }],
        );
        assert_eq!(library.pick_background_lore().unwrap().topic, "origin");
    }

    #[test]
    fn test_load_directory() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("content");
        std::fs::create_dir(&content).unwrap();
        std::fs::write(
            content.join("alice.json"),
            r#"{"author": "@alice", "posts": ["hello", "world"]}"#,
        )
        .unwrap();
        std::fs::write(content.join("empty.json"), r#"{"author": "@nobody", "posts": []}"#).unwrap();
        std::fs::write(content.join("broken.json"), "{").unwrap();
        std::fs::write(content.join("notes.txt"), "ignored").unwrap();

        let lore = dir.path().join("lore.json");
        std::fs::write(&lore, r#"[{"topic": "fun fact", "content": "x"}]"#).unwrap();

        let library = ContentLibrary::load(&content, Some(&lore)).unwrap();
        assert_eq!(library.author_count(), 1);
        assert_eq!(library.post_count(), 2);
        assert!(library.pick_background_lore().is_some());
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = ContentLibrary::load(&dir.path().join("nope"), None).unwrap_err();
        assert!(matches!(err, ContentError::Load { .. }));
    }
}
