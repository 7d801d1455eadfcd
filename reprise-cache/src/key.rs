//! Cache keys derived from page shape and instruction.
use reprise_common::Result;

use crate::page::PageContext;

pub const KEY_SEPARATOR: char = '|';
/// Hex characters of the text digest kept in the key.
pub const DIGEST_LEN: usize = 20;
pub const DEFAULT_KEY_TEXT_LEN: usize = 500;

/// `"{url}|{title}|{digest}|{instruction}"`, where `digest` covers the first
/// `text_len` characters of `visible_text`.
///
/// Two pages sharing URL, title, and text prefix map to the same key for the
/// same instruction. Nothing is normalized.
///
/// ```
/// use reprise_cache::derive_key;
///
/// let a = derive_key("https://app.uniswap.org/swap", "Swap", "Sell Buy", "Click", 500);
/// let b = derive_key("https://app.uniswap.org/swap", "Swap", "Sell Buy", "Click", 500);
/// assert_eq!(a, b);
/// assert!(a.starts_with("https://app.uniswap.org/swap|Swap|"));
/// assert!(a.ends_with("|Click"));
/// ```
pub fn derive_key(
    url: &str,
    title: &str,
    visible_text: &str,
    instruction: &str,
    text_len: usize,
) -> String {
    let prefix: String = visible_text.chars().take(text_len).collect();
    let digest = blake3::hash(prefix.as_bytes()).to_hex();
    let sep = KEY_SEPARATOR;
    format!(
        "{url}{sep}{title}{sep}{}{sep}{instruction}",
        &digest.as_str()[..DIGEST_LEN]
    )
}

/// [`derive_key`] over the page's current URL, title, and text.
pub async fn derive_page_key<P>(page: &P, instruction: &str, text_len: usize) -> Result<String>
where
    P: PageContext + ?Sized,
{
    let url = page.url().await?;
    let title = page.title().await?;
    let text = page.visible_text().await?;
    Ok(derive_key(&url, &title, &text, instruction, text_len))
}
