use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::application::layout::{LayoutResult, PlacedSponsor};
use crate::config::RenderSettings;

/// The sponsor wall SVG document.
#[derive(Template)]
#[template(path = "sponsors.svg", escape = "html")]
pub struct SvgTemplate<'a> {
    pub width: u32,
    pub height: u32,
    pub font_size: u32,
    pub font_family: &'a str,
    pub show_amount: bool,
    pub show_name: bool,
    pub background_color: &'a str,
    pub sponsors: &'a [PlacedSponsor],
}

impl<'a> SvgTemplate<'a> {
    pub fn new(render: &'a RenderSettings, layout: &'a LayoutResult) -> Self {
        Self {
            width: layout.width,
            height: layout.height,
            font_size: render.font_size,
            font_family: render.font_family.as_str(),
            show_amount: render.show_amount,
            show_name: render.show_name,
            background_color: render.background_color.as_str(),
            sponsors: &layout.sponsors,
        }
    }
}

/// Landing page embedding the current wall inline.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub svg: String,
    pub last_updated: String,
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match template.render() {
        Ok(body) => (status, Html(body)).into_response(),
        Err(err) => {
            error!(
                target: "mecenate::presentation",
                error = %err,
                "template rendering failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Template rendering failed",
            )
                .into_response()
        }
    }
}
