//! Request bodies for the ad generation service
//!
//! Both ad kinds share the same overlay sections. A section is omitted from
//! the JSON body when its feature is disabled in the preferences.

use crate::preferences::AdStyle;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceDetails {
    pub price: String,
    pub align: String,
    pub valign: String,
    pub marperc_from_border: f64,
    pub font_size: u32,
    pub line_width: u32,
    pub price_color: String,
    pub price_in_circle: bool,
    pub price_circle_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromoDetails {
    pub promo_text: String,
    pub align: String,
    pub valign: String,
    pub marperc_from_border: f64,
    pub font_size: u32,
    pub line_width: u32,
    pub text_color: String,
    pub rect_color: String,
    pub rect_padding: u32,
    pub rect_radius: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogoDetails {
    pub align: String,
    pub valign: String,
    pub logo_percentage: f64,
    pub margin_px: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloganDetails {
    pub slogan_text: String,
    pub align: String,
    pub valign: String,
    pub marperc_from_border: f64,
    pub font_size: u32,
    pub line_width: u32,
    pub text_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDetails {
    pub activate: bool,
    pub marperc_from_border: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdDecorations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_details: Option<PriceDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_details: Option<PromoDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_details: Option<LogoDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slogan_details: Option<SloganDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_details: Option<FrameDetails>,
}

impl AdDecorations {
    /// Overlay sections for `style`
    ///
    /// `price` is the rendered price text, if any. A non-empty
    /// `promotional_text` from the price lookup replaces the configured promo.
    pub fn from_style(
        style: &AdStyle,
        price: Option<String>,
        promotional_text: Option<&str>,
    ) -> Self {
        let price_details = price.filter(|_| style.enable_price).map(|price| PriceDetails {
            price,
            align: style.price_halign.clone(),
            valign: style.price_valign.clone(),
            marperc_from_border: style.price_marperc_from_border,
            font_size: style.price_font_size,
            line_width: style.price_line_width,
            price_color: style.price_text_color.clone(),
            price_in_circle: style.price_in_circle,
            price_circle_color: style.price_circle_color.clone(),
        });

        let promo_details = style.enable_promotional_text.then(|| PromoDetails {
            promo_text: promotional_text
                .filter(|t| !t.is_empty())
                .unwrap_or(&style.promo_text)
                .to_string(),
            align: style.promo_halign.clone(),
            valign: style.promo_valign.clone(),
            marperc_from_border: style.promo_marperc_from_border,
            font_size: style.promo_font_size,
            line_width: style.promo_line_width,
            text_color: style.promo_text_color.clone(),
            rect_color: style.promo_rect_color.clone(),
            rect_padding: style.promo_rect_padding,
            rect_radius: style.promo_rect_radius,
        });

        let logo_details = style.enable_logo.then(|| LogoDetails {
            align: style.logo_halign.clone(),
            valign: style.logo_valign.clone(),
            logo_percentage: style.logo_percentage,
            margin_px: style.logo_margin_px,
        });

        let slogan_details = style.enable_slogan_definition.then(|| SloganDetails {
            slogan_text: style.slogan_text.clone(),
            align: style.slogan_halign.clone(),
            valign: style.slogan_valign.clone(),
            marperc_from_border: style.slogan_marperc_from_border,
            font_size: style.slogan_font_size,
            line_width: style.slogan_line_width,
            text_color: style.slogan_text_color.clone(),
        });

        let frame_details = style.enable_frame.then(|| FrameDetails {
            activate: true,
            marperc_from_border: style.frame_marperc_from_border,
        });

        Self {
            price_details,
            promo_details,
            logo_details,
            slogan_details,
            frame_details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredefinedAdRequest {
    pub query: String,
    pub n_results: u32,
    pub use_default_ad_onempty: bool,
    #[serde(flatten)]
    pub decorations: AdDecorations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicAdRequest {
    pub description: String,
    pub device: String,
    #[serde(flatten)]
    pub decorations: AdDecorations,
}
