//! Timeline export into the content library.

use std::path::Path;

use crate::config::SocialConfig;
use crate::content::write_author_file;
use crate::social::{TimelineReader, XClient};

/// Fetch up to `max_posts` recent posts by `handle` and save them as a
/// library file under `content_dir`.
pub async fn run_extract_command(
    handle: &str,
    max_posts: usize,
    content_dir: &Path,
    social: SocialConfig,
) -> anyhow::Result<()> {
    let handle = handle.trim().trim_start_matches('@');
    if handle.is_empty() {
        anyhow::bail!("handle must not be empty");
    }
    if max_posts == 0 {
        anyhow::bail!("--max-posts must be at least 1");
    }

    let client = XClient::new(social);
    TimelineReader::ensure_ready(&client).await?;

    let posts = client.recent_posts(handle, max_posts).await?;
    if posts.is_empty() {
        println!("@{} has no original posts to extract", handle);
        return Ok(());
    }

    let texts: Vec<String> = posts.into_iter().map(|p| p.text).collect();
    let path = write_author_file(content_dir, handle, &texts)?;
    println!(
        "Extracted {} post(s) from @{} into {}",
        texts.len(),
        handle,
        path.display()
    );
    Ok(())
}
