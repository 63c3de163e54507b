//! Raster tile overlays (satellite products, exposure surfaces).

use api::{Pollutant, TileDescriptor};
use map::host::{MapError, MapHost};
use map::source::DEFAULT_TILE_SIZE;
use map::style::{Expr, LayerKind, LayerSpec};

use crate::layer::{LayerBinding, SourceData};
use crate::symbology::{Legend, palette_legend};

/// Native resolution ceiling of the satellite products.
pub const SATELLITE_MAX_ZOOM: u8 = 10;
pub const DEFAULT_OPACITY: f64 = 0.7;

/// Rewrites the placeholder spellings tile services use (`{zoom}`, `${z}`,
/// `{TileMatrix}`, `{TileCol}`, `{TileRow}`, percent-encoded braces) to the
/// canonical `{z}`/`{x}`/`{y}`. Unknown placeholders are left untouched.
pub fn normalize_tile_template(raw: &str) -> String {
    let decoded = decode_braces(raw.trim());
    let mut out = String::with_capacity(decoded.len());
    let mut rest = decoded.as_str();

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        let mut prefix = &rest[..open];
        let name = &rest[open + 1..close];
        let canonical = canonical_placeholder(name);
        if canonical.is_some() {
            prefix = prefix.strip_suffix('$').unwrap_or(prefix);
        }
        out.push_str(prefix);
        match canonical {
            Some(c) => out.push_str(c),
            None => out.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn canonical_placeholder(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "z" | "zoom" | "level" | "tilematrix" => Some("{z}"),
        "x" | "col" | "tilecol" => Some("{x}"),
        "y" | "row" | "tilerow" => Some("{y}"),
        _ => None,
    }
}

fn decode_braces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        let code = rest.get(i + 1..i + 3);
        match code.map(str::to_ascii_uppercase).as_deref() {
            Some("7B") => out.push('{'),
            Some("7D") => out.push('}'),
            Some("24") => out.push('$'),
            _ => {
                out.push('%');
                rest = &rest[i + 1..];
                continue;
            }
        }
        rest = &rest[i + 3..];
    }
    out.push_str(rest);
    out
}

/// Ids of one raster overlay on the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RasterIds {
    pub source: &'static str,
    pub layer: &'static str,
}

/// Pollutant and date a tile request was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterProduct {
    pub pollutant: Pollutant,
    pub date: String,
}

impl RasterProduct {
    pub fn new(pollutant: Pollutant, date: impl Into<String>) -> Self {
        Self {
            pollutant,
            date: date.into(),
        }
    }
}

/// A single raster layer showing whatever tiles the last descriptor named.
#[derive(Debug)]
pub struct RasterOverlay {
    pub ids: RasterIds,
    pub binding: LayerBinding,
    /// Product of the mounted tiles.
    product: Option<RasterProduct>,
    opacity: f64,
    legend: Option<Legend>,
    title: &'static str,
}

impl RasterOverlay {
    pub fn new(ids: RasterIds, binding: LayerBinding, title: &'static str) -> Self {
        Self {
            ids,
            binding,
            product: None,
            opacity: DEFAULT_OPACITY,
            legend: None,
            title,
        }
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn legend(&self) -> Option<Legend> {
        self.legend.clone()
    }

    pub fn product(&self) -> Option<&RasterProduct> {
        self.product.as_ref().filter(|_| self.binding.is_mounted())
    }

    /// Shows `tiles`, requested for `product`. Without a descriptor the
    /// mounted tiles stay only while they still belong to `product`.
    pub fn update(
        &mut self,
        host: &mut dyn MapHost,
        product: Option<&RasterProduct>,
        tiles: Option<&TileDescriptor>,
        visible: bool,
        opacity: f64,
    ) -> Result<(), MapError> {
        let opacity = opacity.clamp(0.0, 1.0);
        let Some(tiles) = tiles else {
            if self.binding.is_mounted() && self.product.as_ref() != product {
                tracing::debug!(source = %self.ids.source, "tiles superseded, removing overlay");
                self.product = None;
                self.legend = None;
                return self.binding.teardown(host);
            }
            self.binding.set_visible(host, visible)?;
            return self.apply_opacity(host, opacity);
        };

        let template = normalize_tile_template(&tiles.tile_url);
        let data = SourceData::Raster {
            template,
            tile_size: DEFAULT_TILE_SIZE,
            max_zoom: Some(SATELLITE_MAX_ZOOM),
        };
        let ids = self.ids;
        self.binding.set_data(host, data, visible, || {
            vec![
                LayerSpec::new(ids.layer, ids.source, LayerKind::Raster)
                    .paint("raster-opacity", opacity),
            ]
        })?;
        self.apply_opacity(host, opacity)?;
        self.product = product.cloned();

        self.legend = match (&tiles.palette, tiles.min_value, tiles.max_value) {
            (Some(palette), Some(min), Some(max)) => palette_legend(self.title, palette, min, max),
            _ => None,
        };
        Ok(())
    }

    fn apply_opacity(&mut self, host: &mut dyn MapHost, opacity: f64) -> Result<(), MapError> {
        if (self.opacity - opacity).abs() > f64::EPSILON {
            self.binding
                .set_paint(host, self.ids.layer, "raster-opacity", Expr::lit(opacity))?;
        }
        self.opacity = opacity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::geo::LngLat;
    use map::headless::HeadlessMap;
    use map::source::TileCoord;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn normalizes_placeholder_spellings() {
        let cases = [
            ("https://t/{z}/{x}/{y}.png", "https://t/{z}/{x}/{y}.png"),
            ("https://t/{zoom}/{x}/{y}", "https://t/{z}/{x}/{y}"),
            ("https://t/${z}/${x}/${y}", "https://t/{z}/{x}/{y}"),
            (
                "https://t/wmts/{TileMatrix}/{TileCol}/{TileRow}",
                "https://t/wmts/{z}/{x}/{y}",
            ),
            ("https://t/%7Bz%7D/%7bx%7d/%7By%7D", "https://t/{z}/{x}/{y}"),
            ("https://t/{Z}/{X}/{Y}?token={key}", "https://t/{z}/{x}/{y}?token={key}"),
            ("https://t/a%20b/{z}/{x}/{y}", "https://t/a%20b/{z}/{x}/{y}"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_tile_template(raw), expected, "{raw}");
        }
    }

    fn overlay() -> RasterOverlay {
        RasterOverlay::new(
            RasterIds {
                source: "sat-src",
                layer: "sat-layer",
            },
            LayerBinding::new("sat-src"),
            "Satellite",
        )
    }

    fn no2() -> RasterProduct {
        RasterProduct::new(Pollutant::No2, "2024-05-03")
    }

    fn tiles(url: &str) -> TileDescriptor {
        serde_json::from_value(json!({
            "tile_url": url,
            "min_value": 0.0,
            "max_value": 1.0,
            "palette": ["#000000", "#FFFFFF"]
        }))
        .expect("descriptor")
    }

    #[test]
    fn overlay_caps_zoom_and_tracks_opacity() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut o = overlay();
        o.update(&mut map, Some(&no2()), Some(&tiles("https://t/{zoom}/{x}/{y}")), true, 0.5)
            .expect("mount");
        assert_eq!(
            map.tile_url("sat-src", TileCoord::new(13, 8, 8)).as_deref(),
            Some("https://t/10/1/1")
        );
        assert_eq!(map.paint_value("sat-layer", "raster-opacity"), Some(json!(0.5)));

        o.update(&mut map, Some(&no2()), Some(&tiles("https://t/{zoom}/{x}/{y}")), true, 1.7)
            .expect("opacity");
        assert_eq!(map.paint_value("sat-layer", "raster-opacity"), Some(json!(1.0)));
        assert_eq!(o.legend().map(|l| l.entries.len()), Some(2));
    }

    #[test]
    fn missing_descriptor_keeps_the_last_tiles() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut o = overlay();
        o.update(&mut map, Some(&no2()), Some(&tiles("https://t/{z}/{x}/{y}")), true, 0.5)
            .expect("mount");
        o.update(&mut map, Some(&no2()), None, false, 0.3).expect("hide");
        assert_eq!(map.layer_visibility("sat-layer"), Some(false));
        assert_eq!(map.paint_value("sat-layer", "raster-opacity"), Some(json!(0.3)));
        assert!(map.has_source("sat-src"));
    }

    #[test]
    fn tiles_of_another_product_are_removed_while_loading() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut o = overlay();
        o.update(&mut map, Some(&no2()), Some(&tiles("https://t/no2/{z}/{x}/{y}")), true, 0.5)
            .expect("mount");
        assert_eq!(o.product(), Some(&no2()));

        let so2 = RasterProduct::new(Pollutant::So2, "2024-05-03");
        o.update(&mut map, Some(&so2), None, true, 0.5).expect("switch");
        assert!(!map.has_source("sat-src"));
        assert!(!map.has_layer("sat-layer"));
        assert_eq!(o.legend(), None);
        assert_eq!(o.product(), None);

        o.update(&mut map, Some(&so2), Some(&tiles("https://t/so2/{z}/{x}/{y}")), true, 0.5)
            .expect("remount");
        assert_eq!(
            map.tile_url("sat-src", TileCoord::new(2, 1, 1)).as_deref(),
            Some("https://t/so2/2/1/1")
        );

        o.update(&mut map, None, None, true, 0.5).expect("no date");
        assert!(!map.has_source("sat-src"));
    }
}
