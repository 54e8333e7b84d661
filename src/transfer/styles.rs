//! SLD style uploads and their association with existing layers.

use super::{file_stem, TransferContext, TransferReport};
use crate::dispatch::TransferJob;
use crate::error::Result;
use tracing::info;

/// Words shared between style and layer names that tie a colormap to a layer.
pub const STYLE_KEYWORDS: [&str; 7] = ["depth", "density", "swe", "dem", "veg", "height", "mask"];

/// Server-side style preferred when no colormap matches a layer.
pub const DYNAMIC_DEFAULT_STYLE: &str = "dynamic_default";

/// GeoServer's built-in raster style.
pub const FALLBACK_STYLE: &str = "raster";

fn bare_name(layer: &str) -> String {
    layer.rsplit(':').next().unwrap_or(layer).to_lowercase()
}

/// Pick the layer a style belongs to, or `None` when there is no single answer.
///
/// An exact name wins, then `<style>_latest`, then the only layer sharing a
/// keyword from [`STYLE_KEYWORDS`] with the style. A `workspace:` prefix on
/// layer names is ignored for matching and kept in the result.
pub fn match_layer(style_name: &str, known_layers: &[String]) -> Option<String> {
    let style = style_name.trim().to_lowercase();
    if style.is_empty() {
        return None;
    }

    if let Some(layer) = known_layers.iter().find(|l| bare_name(l) == style) {
        return Some(layer.clone());
    }

    let latest = format!("{}_latest", style);
    if let Some(layer) = known_layers.iter().find(|l| bare_name(l) == latest) {
        return Some(layer.clone());
    }

    let keywords: Vec<&str> = STYLE_KEYWORDS
        .iter()
        .copied()
        .filter(|k| style.contains(k))
        .collect();
    if keywords.is_empty() {
        return None;
    }

    let candidates: Vec<&String> = known_layers
        .iter()
        .filter(|l| {
            let bare = bare_name(l);
            keywords.iter().any(|k| bare.contains(k))
        })
        .collect();

    match candidates.as_slice() {
        [only] => Some((*only).clone()),
        _ => None,
    }
}

/// Styles from `available` sharing a keyword with `layer`, followed by
/// [`DYNAMIC_DEFAULT_STYLE`] when the server has it.
pub fn keyword_styles(layer: &str, available: &[String]) -> Vec<String> {
    let layer = bare_name(layer);
    let mut result: Vec<String> = Vec::new();

    for key in STYLE_KEYWORDS.iter().filter(|k| layer.contains(*k)) {
        for style in available {
            if style.to_lowercase().contains(key) && !result.contains(style) {
                result.push(style.clone());
            }
        }
    }

    if available.iter().any(|s| s == DYNAMIC_DEFAULT_STYLE)
        && !result.iter().any(|s| s == DYNAMIC_DEFAULT_STYLE)
    {
        result.push(DYNAMIC_DEFAULT_STYLE.to_string());
    }
    result
}

/// `swe` for `swe_latest` and `swe_20200101`.
fn layer_base(bare: &str) -> &str {
    match bare.rsplit_once('_') {
        Some((base, suffix))
            if suffix == "latest"
                || (!suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())) =>
        {
            base
        }
        _ => bare,
    }
}

/// Default style for a layer out of its [`keyword_styles`].
///
/// A style named after the layer's variable wins, then any other keyword
/// style, then [`DYNAMIC_DEFAULT_STYLE`], then [`FALLBACK_STYLE`].
pub fn default_style(layer: &str, candidates: &[String]) -> String {
    let bare = bare_name(layer);
    let base = layer_base(&bare);

    candidates
        .iter()
        .find(|s| s.to_lowercase() == base)
        .or_else(|| candidates.iter().find(|s| *s != DYNAMIC_DEFAULT_STYLE))
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| FALLBACK_STYLE.to_string())
}

/// Give freshly published layers their colormaps. Republishing a layer drops
/// its styles on the server, so this runs after every raster upload.
/// Failures only produce warnings.
pub(crate) async fn assign_layer_styles(
    workspace: &str,
    layers: &[String],
    ctx: &TransferContext<'_>,
    report: &mut TransferReport,
) {
    let available = match ctx.server.list_styles().await {
        Ok(styles) => styles,
        Err(e) => {
            report.warn(format!("Could not list styles, layers keep server defaults: {}", e));
            return;
        }
    };

    let mut done: Vec<&str> = Vec::new();
    for layer in layers {
        let name = layer.rsplit(':').next().unwrap_or(layer);
        if done.contains(&name) {
            continue;
        }
        done.push(name);

        let candidates = keyword_styles(name, &available);
        let default = default_style(name, &candidates);
        info!("Assigning {} as default style of {}:{}", default, workspace, name);

        if let Err(e) = ctx.server.set_default_style(workspace, name, &default).await {
            report.warn(format!(
                "Could not assign default style {} to {}:{}: {}",
                default, workspace, name, e
            ));
            continue;
        }

        if !candidates.is_empty() {
            if let Err(e) = ctx.server.set_layer_styles(workspace, name, &candidates).await {
                report.warn(format!(
                    "Could not attach styles to {}:{}: {}",
                    workspace, name, e
                ));
            }
        }
    }
}

pub async fn upload(job: &TransferJob, ctx: &TransferContext<'_>) -> Result<TransferReport> {
    let mut report = TransferReport::default();

    let mut styles = Vec::with_capacity(job.files.len());
    for path in &job.files {
        let name = file_stem(path)?;
        let body = tokio::fs::read(path).await?;
        styles.push((path, name, body));
    }

    let workspace = job.basin.map(|b| b.workspace());
    let known_layers = match ctx.server.list_layers(workspace).await {
        Ok(layers) => layers,
        Err(e) => {
            report.warn(format!(
                "Could not list layers, styles will be uploaded without association: {}",
                e
            ));
            Vec::new()
        }
    };

    info!(
        "Uploading {} style(s), {} layer(s) available for association",
        styles.len(),
        known_layers.len()
    );

    for (path, name, body) in styles {
        info!("Adding the {} style...", name);
        if let Err(e) = ctx.server.replace_style(&name, body).await {
            if e.is_validation() {
                return Err(e);
            }
            report.warn(format!("Failed to upload style {}: {}", path.display(), e));
            continue;
        }
        report.styles.push(name.clone());

        let Some(layer) = match_layer(&name, &known_layers) else {
            report.warn(format!(
                "No single layer matches style {}, uploaded without association",
                name
            ));
            continue;
        };

        let (layer_ws, layer_name) = match layer.split_once(':') {
            Some((ws, bare)) => (ws.to_string(), bare.to_string()),
            None => match workspace {
                Some(ws) => (ws.to_string(), layer.clone()),
                None => {
                    report.warn(format!(
                        "Layer {} for style {} has no workspace, skipping association",
                        layer, name
                    ));
                    continue;
                }
            },
        };

        match ctx
            .server
            .set_default_style(&layer_ws, &layer_name, &name)
            .await
        {
            Ok(()) => info!("Assigned {} as default style of {}:{}", name, layer_ws, layer_name),
            Err(e) => report.warn(format!(
                "Uploaded style {} but could not assign it to {}:{}: {}",
                name, layer_ws, layer_name, e
            )),
        }
    }

    Ok(report)
}
