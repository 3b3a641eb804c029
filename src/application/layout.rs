//! Deterministic sponsor wall layout.
//!
//! Greedy row packing, left-to-right then top-to-bottom, with one configured
//! avatar size for every sponsor. Only the canvas height is derived from
//! content; the width is fixed by configuration. Avatar resolution happens
//! while placing, and a failed resolution substitutes the default avatar
//! rather than aborting the layout.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::config::RenderSettings;
use crate::domain::sponsor::Sponsor;
use crate::infra::avatars::AvatarStore;

/// Vertical offset between the top padding and the first row.
const TOP_ROW_OFFSET: u32 = 10;
/// Gap between an avatar and its text labels.
const LABEL_GAP: u32 = 5;
/// Extra leading between the name line and the amount line.
const AMOUNT_LINE_LEADING: u32 = 2;

const FALLBACK_AVATAR_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
  <rect width="100" height="100" fill="#f2f2f2"/>
  <text x="50" y="50" font-family="sans-serif" font-size="20" text-anchor="middle" dominant-baseline="middle" fill="#666">?</text>
</svg>"##;

/// Inline placeholder used when neither the sponsor's avatar nor the
/// configured default can be resolved.
pub static FALLBACK_AVATAR: Lazy<String> = Lazy::new(|| {
    format!(
        "data:image/svg+xml;base64,{}",
        BASE64.encode(FALLBACK_AVATAR_SVG)
    )
});

/// A sponsor placed on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSponsor {
    pub name: String,
    pub link: String,
    /// Resolved avatar payload as an embeddable data URI.
    pub avatar: String,
    pub amount: String,
    pub x: u32,
    pub y: u32,
    pub size: u32,
    pub name_x: u32,
    pub name_y: u32,
    pub amount_x: u32,
    pub amount_y: u32,
}

/// Canvas dimensions plus every placed sponsor, in render order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutResult {
    pub width: u32,
    pub height: u32,
    pub sponsors: Vec<PlacedSponsor>,
}

/// Lay the ordered sponsor list out onto the canvas.
pub async fn layout_sponsors(
    sponsors: &[Sponsor],
    render: &RenderSettings,
    avatars: &AvatarStore,
) -> LayoutResult {
    let mut placed = Vec::with_capacity(sponsors.len());
    let mut cursor = RowCursor::new(render);

    for sponsor in sponsors {
        let (x, y) = cursor.place();
        let avatar = resolve_avatar(sponsor, render, avatars).await;
        let size = render.avatar_size;
        let name_x = x + size + LABEL_GAP;
        let name_y = y + size / 2;

        placed.push(PlacedSponsor {
            name: sponsor.name.clone(),
            link: sponsor.link.clone(),
            avatar,
            amount: format!("{:.2}", sponsor.monthly_amount),
            x,
            y,
            size,
            name_x,
            name_y,
            amount_x: name_x,
            amount_y: name_y + render.font_size + AMOUNT_LINE_LEADING,
        });
    }

    LayoutResult {
        width: render.canvas_width,
        height: cursor.canvas_height(),
        sponsors: placed,
    }
}

/// Greedy row-packing position state.
struct RowCursor<'a> {
    render: &'a RenderSettings,
    current_x: u32,
    row_y: u32,
    max_y: u32,
}

impl<'a> RowCursor<'a> {
    fn new(render: &'a RenderSettings) -> Self {
        Self {
            render,
            current_x: render.padding_x,
            row_y: render.padding_y + TOP_ROW_OFFSET,
            max_y: 0,
        }
    }

    /// Yield the next placement position, wrapping to a new row when the
    /// avatar would cross the right padding. An avatar wider than the canvas
    /// still lands at the left padding; there is no scaling or clipping.
    fn place(&mut self) -> (u32, u32) {
        let render = self.render;
        if self.current_x + render.avatar_size > render.canvas_width.saturating_sub(render.padding_x)
        {
            self.current_x = render.padding_x;
            self.row_y = self.max_y + render.avatar_margin;
        }

        let position = (self.current_x, self.row_y);
        self.current_x += render.avatar_size + render.avatar_margin;
        self.max_y = self.max_y.max(self.row_y + render.avatar_size);
        position
    }

    fn canvas_height(&self) -> u32 {
        self.max_y + self.render.padding_y + self.render.avatar_size
    }
}

async fn resolve_avatar(
    sponsor: &Sponsor,
    render: &RenderSettings,
    avatars: &AvatarStore,
) -> String {
    let reference = if sponsor.avatar_url.is_empty() {
        default_avatar_ref(render)
    } else {
        sponsor.avatar_url.as_str()
    };

    match avatars.resolve(reference).await {
        Ok(payload) => payload,
        Err(err) => {
            warn!(
                target: "mecenate::layout",
                sponsor = %sponsor.login,
                error = %err,
                "avatar resolution failed; substituting default avatar"
            );
            let fallback = default_avatar_ref(render);
            if fallback == reference {
                return FALLBACK_AVATAR.clone();
            }
            match avatars.resolve(fallback).await {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(
                        target: "mecenate::layout",
                        error = %err,
                        "default avatar resolution failed; using built-in placeholder"
                    );
                    FALLBACK_AVATAR.clone()
                }
            }
        }
    }
}

fn default_avatar_ref(render: &RenderSettings) -> &str {
    render
        .default_avatar
        .as_deref()
        .unwrap_or_else(|| FALLBACK_AVATAR.as_str())
}
