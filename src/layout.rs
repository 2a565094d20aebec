//! The poster document: a fixed 720x1280 logical canvas and the elements on it.
//!
//! All geometry here is in logical canvas units. Screen pixels never reach
//! this module; the interaction layer converts before calling `update`.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::types::Color;

pub const POSTER_WIDTH: u32 = 720;
pub const POSTER_HEIGHT: u32 = 1280;

/// Stable element key (`"logo"`, `"proverb"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_size: f32,
    pub color: Color,
    pub font_family: String,
    pub align: TextAlign,
    pub line_height: f32,
    pub font_weight: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
}

impl TextStyle {
    pub fn is_bold(&self) -> bool {
        self.font_weight >= 600
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStyle {
    pub width: f32,
    pub rotation: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecorationStyle {
    pub size: f32,
    pub color: Color,
    pub opacity: f32,
    pub rotation: f32,
}

/// Per-kind style. The tag keeps text fields off images and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Style {
    Text(TextStyle),
    Image(ImageStyle),
    Decoration(DecorationStyle),
}

/// Which scalar the corner handle drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAxis {
    Width,
    FontSize,
}

impl Style {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Style::Text(_) => "text",
            Style::Image(_) => "image",
            Style::Decoration(_) => "decoration",
        }
    }

    pub fn resize_axis(&self) -> ResizeAxis {
        match self {
            Style::Text(_) => ResizeAxis::FontSize,
            Style::Image(_) | Style::Decoration(_) => ResizeAxis::Width,
        }
    }

    /// fontSize for text, width for images, size for decorations.
    pub fn size_scalar(&self) -> f32 {
        match self {
            Style::Text(t) => t.font_size,
            Style::Image(i) => i.width,
            Style::Decoration(d) => d.size,
        }
    }

    /// A patch of the matching kind that sets the size scalar to `value`.
    pub fn size_patch(&self, value: f32) -> StylePatch {
        match self {
            Style::Text(_) => StylePatch::Text(TextStylePatch { font_size: Some(value), ..Default::default() }),
            Style::Image(_) => StylePatch::Image(ImageStylePatch { width: Some(value), ..Default::default() }),
            Style::Decoration(_) => {
                StylePatch::Decoration(DecorationStylePatch { size: Some(value), ..Default::default() })
            }
        }
    }

    pub fn rotation(&self) -> f32 {
        match self {
            Style::Text(t) => t.rotation.unwrap_or(0.0),
            Style::Image(i) => i.rotation,
            Style::Decoration(d) => d.rotation,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            Style::Text(t) => t.opacity.unwrap_or(1.0),
            Style::Image(_) => 1.0,
            Style::Decoration(d) => d.opacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: ElementId,
    /// Text, image reference (path, URL or data URL), or nothing.
    pub content: Option<String>,
    pub position: Position,
    pub z_index: i32,
    pub style: Style,
}

impl Element {
    /// Whether there is anything to paint or grab.
    pub fn is_visible(&self) -> bool {
        match self.style {
            Style::Image(_) => self.content.as_deref().is_some_and(|c| !c.is_empty()),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextStylePatch {
    pub font_size: Option<f32>,
    pub color: Option<Color>,
    pub font_family: Option<String>,
    pub align: Option<TextAlign>,
    pub line_height: Option<f32>,
    pub font_weight: Option<u16>,
    pub opacity: Option<f32>,
    pub rotation: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageStylePatch {
    pub width: Option<f32>,
    pub rotation: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecorationStylePatch {
    pub size: Option<f32>,
    pub color: Option<Color>,
    pub opacity: Option<f32>,
    pub rotation: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StylePatch {
    Text(TextStylePatch),
    Image(ImageStylePatch),
    Decoration(DecorationStylePatch),
}

impl StylePatch {
    fn kind_name(&self) -> &'static str {
        match self {
            StylePatch::Text(_) => "text",
            StylePatch::Image(_) => "image",
            StylePatch::Decoration(_) => "decoration",
        }
    }
}

/// Partial element update. `None` fields are left alone; `content: Some(None)` clears.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub content: Option<Option<String>>,
    pub position: Option<Position>,
    pub style: Option<StylePatch>,
}

impl ElementPatch {
    pub fn position(p: Position) -> Self {
        Self { position: Some(p), ..Default::default() }
    }

    pub fn content(c: Option<String>) -> Self {
        Self { content: Some(c), ..Default::default() }
    }

    pub fn style(s: StylePatch) -> Self {
        Self { style: Some(s), ..Default::default() }
    }
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn apply_style(id: &ElementId, style: &mut Style, patch: StylePatch) -> Result<(), LayoutError> {
    match (style, patch) {
        (Style::Text(s), StylePatch::Text(p)) => {
            merge(&mut s.font_size, p.font_size);
            merge(&mut s.color, p.color);
            merge(&mut s.font_family, p.font_family);
            merge(&mut s.align, p.align);
            merge(&mut s.line_height, p.line_height);
            merge(&mut s.font_weight, p.font_weight);
            if p.opacity.is_some() { s.opacity = p.opacity; }
            if p.rotation.is_some() { s.rotation = p.rotation; }
        }
        (Style::Image(s), StylePatch::Image(p)) => {
            merge(&mut s.width, p.width);
            merge(&mut s.rotation, p.rotation);
        }
        (Style::Decoration(s), StylePatch::Decoration(p)) => {
            merge(&mut s.size, p.size);
            merge(&mut s.color, p.color);
            merge(&mut s.opacity, p.opacity);
            merge(&mut s.rotation, p.rotation);
        }
        (style, patch) => {
            return Err(LayoutError::StyleKindMismatch {
                id: id.to_string(),
                actual: style.kind_name(),
                patch: patch.kind_name(),
            });
        }
    }
    Ok(())
}

/// Ordered `id -> Element` mapping; declaration order breaks z-index ties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutModel {
    elements: IndexMap<ElementId, Element>,
}

impl LayoutModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends (or replaces in place) an element.
    pub fn insert(&mut self, element: Element) {
        self.elements.insert(element.id.clone(), element);
    }

    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Shallow-merge `patch` into the element. No cross-field validation.
    pub fn update(&mut self, id: &ElementId, patch: ElementPatch) -> Result<&Element, LayoutError> {
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| LayoutError::UnknownElement(id.to_string()))?;

        if let Some(style) = patch.style {
            apply_style(id, &mut element.style, style)?;
        }
        if let Some(content) = patch.content {
            element.content = content;
        }
        if let Some(position) = patch.position {
            element.position = position;
        }
        Ok(&*element)
    }

    /// Back-to-front paint order: ascending z-index, stable on declaration order.
    pub fn paint_order(&self) -> Vec<&Element> {
        let mut ordered: Vec<&Element> = self.elements.values().collect();
        ordered.sort_by_key(|e| e.z_index);
        ordered
    }

    /// The built-in poster, with today's date filled into the date elements.
    pub fn default_poster(today: NaiveDate) -> Self {
        let text = |size: f32, family: &str, align: TextAlign, line_height: f32, weight: u16, opacity: f32| {
            Style::Text(TextStyle {
                font_size: size,
                color: Color::WHITE,
                font_family: family.to_string(),
                align,
                line_height,
                font_weight: weight,
                opacity: Some(opacity),
                rotation: Some(0.0),
            })
        };
        let el = |id: &str, content: Option<&str>, x: f32, y: f32, z: i32, style: Style| Element {
            id: ElementId::from(id),
            content: content.map(str::to_string),
            position: Position::new(x, y),
            z_index: z,
            style,
        };

        let sans = "\"Noto Sans SC\", sans-serif";
        let yahei = "\"Microsoft YaHei\", sans-serif";
        let day = today.day().to_string();
        let month_year = today.format("%b. %Y").to_string();

        let mut model = Self::new();
        model.insert(el("mainTextCN", Some("早安"), 80.0, 180.0, 20,
            text(160.0, sans, TextAlign::Left, 1.1, 900, 1.0)));
        model.insert(el("mainTextEN", Some("Good Morning"), 60.0, 380.0, 21,
            text(60.0, "\"ZCOOL KuaiLe\", cursive", TextAlign::Left, 1.1, 400, 1.0)));
        model.insert(el("yiLearning", Some("易 学习"), 480.0, 395.0, 22,
            text(40.0, yahei, TextAlign::Center, 1.0, 400, 0.9)));
        model.insert(el(
            "proverb",
            Some("Life is bright and everything is lovely.\n生活明朗，万物可爱。\n—— 佚名"),
            40.0, 1050.0, 20,
            text(32.0, yahei, TextAlign::Left, 1.5, 700, 1.0),
        ));
        model.insert(el("logo", None, 400.0, 40.0, 30,
            Style::Image(ImageStyle { width: 280.0, rotation: 0.0 })));
        model.insert(el("dateMonthYear", Some(month_year.as_str()), 500.0, 460.0, 15,
            text(50.0, sans, TextAlign::Right, 1.0, 700, 1.0)));
        model.insert(el("dateDay", Some(day.as_str()), 580.0, 540.0, 16,
            text(200.0, sans, TextAlign::Center, 1.0, 900, 1.0)));
        model.insert(el("sun", Some("sun"), 520.0, 1020.0, 10,
            Style::Decoration(DecorationStyle {
                size: 180.0,
                color: Color::rgb(0xdf, 0xff, 0x00),
                opacity: 0.9,
                rotation: 0.0,
            })));
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poster() -> LayoutModel {
        LayoutModel::default_poster(NaiveDate::from_ymd_opt(2025, 1, 7).unwrap())
    }

    #[test]
    fn default_poster_has_builtin_elements_and_dates() {
        let m = poster();
        assert_eq!(m.len(), 8);
        let day = m.get(&"dateDay".into()).unwrap();
        assert_eq!(day.content.as_deref(), Some("7"));
        let my = m.get(&"dateMonthYear".into()).unwrap();
        assert_eq!(my.content.as_deref(), Some("Jan. 2025"));
        assert!(!m.get(&"logo".into()).unwrap().is_visible());
    }

    #[test]
    fn update_merges_only_given_fields() {
        let mut m = poster();
        let id = ElementId::from("proverb");
        let patch = ElementPatch {
            position: Some(Position::new(1.0, 2.0)),
            style: Some(StylePatch::Text(TextStylePatch { font_size: Some(40.0), ..Default::default() })),
            ..Default::default()
        };
        let el = m.update(&id, patch).unwrap();
        assert_eq!(el.position, Position::new(1.0, 2.0));
        let Style::Text(t) = &el.style else { panic!("proverb should be text") };
        assert_eq!(t.font_size, 40.0);
        assert_eq!(t.line_height, 1.5);
        assert!(el.content.as_deref().unwrap().starts_with("Life is bright"));
    }

    #[test]
    fn removing_logo_keeps_geometry() {
        let mut m = poster();
        let id = ElementId::from("logo");
        m.update(&id, ElementPatch::content(Some("data:image/png;base64,AAAA".into()))).unwrap();
        m.update(&id, ElementPatch::position(Position::new(10.0, 20.0))).unwrap();
        let el = m.update(&id, ElementPatch::content(None)).unwrap();
        assert_eq!(el.content, None);
        assert_eq!(el.position, Position::new(10.0, 20.0));
        assert_eq!(el.style.size_scalar(), 280.0);
    }

    #[test]
    fn mismatched_style_patch_is_rejected() {
        let mut m = poster();
        let err = m
            .update(&"sun".into(), ElementPatch::style(StylePatch::Image(ImageStylePatch::default())))
            .unwrap_err();
        assert!(matches!(err, LayoutError::StyleKindMismatch { .. }));
        assert!(matches!(
            m.update(&"ghost".into(), ElementPatch::default()),
            Err(LayoutError::UnknownElement(_))
        ));
    }

    #[test]
    fn paint_order_breaks_ties_by_declaration() {
        let m = poster();
        let ids: Vec<&str> = m.paint_order().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            ["sun", "dateMonthYear", "dateDay", "mainTextCN", "proverb", "mainTextEN", "yiLearning", "logo"]
        );
    }

    #[test]
    fn resize_axis_follows_style_kind() {
        let m = poster();
        assert_eq!(m.get(&"proverb".into()).unwrap().style.resize_axis(), ResizeAxis::FontSize);
        assert_eq!(m.get(&"logo".into()).unwrap().style.resize_axis(), ResizeAxis::Width);
        assert_eq!(m.get(&"sun".into()).unwrap().style.resize_axis(), ResizeAxis::Width);
    }

    #[test]
    fn model_roundtrips_through_json_in_order() {
        let m = poster();
        let json = serde_json::to_string(&m).unwrap();
        let back: LayoutModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
