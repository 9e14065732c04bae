//! Image tag rewriting for display

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img([^>]+)>").expect("valid img pattern"));
static DATA_RATIO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-ratio="([\d.]+)""#).expect("valid ratio pattern"));
static STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"style="([^"]*)""#).expect("valid style pattern"));
static SRC_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(src|data-src)="([^"]+)""#).expect("valid src pattern"));

/// Stabilize image layout and point relative sources at the asset prefix
///
/// Tags carrying `data-ratio` (height over width) get an `aspect-ratio`
/// style prepended to any existing style. Relative `src` and `data-src`
/// values become `{asset_base}/{src}`; absolute, rooted and `data:` values
/// are kept.
pub fn rewrite_images(content: &str, asset_base: &str) -> String {
    IMG_TAG
        .replace_all(content, |caps: &Captures| {
            let attrs = &caps[1];
            let mut new_attrs = attrs.to_string();

            if let Some(ratio) = DATA_RATIO
                .captures(attrs)
                .and_then(|c| c[1].parse::<f64>().ok())
            {
                let aspect = format!(
                    "aspect-ratio: 1 / {}; width: 100%; height: auto; display: block; scroll-margin-top: 80px;",
                    ratio
                );
                new_attrs = match STYLE.captures(attrs) {
                    Some(style) => new_attrs.replacen(
                        &style[0],
                        &format!(r#"style="{} {}""#, aspect, &style[1]),
                        1,
                    ),
                    None => format!(r#"{} style="{}""#, new_attrs, aspect),
                };
            }

            let new_attrs = SRC_ATTR.replace_all(&new_attrs, |src: &Captures| {
                let value = &src[2];
                if value.starts_with("http") || value.starts_with("data:") || value.starts_with('/') {
                    src[0].to_string()
                } else {
                    format!(r#"{}="{}/{}""#, &src[1], asset_base, value)
                }
            });

            format!("<img{}>", new_attrs)
        })
        .into_owned()
}
