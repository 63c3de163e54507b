use layers::{Layer, Legend};

/// Legends of the components currently on screen, one per title, in the
/// order given.
pub fn visible_legends(components: &[&dyn Layer]) -> Vec<Legend> {
    let mut out: Vec<Legend> = Vec::new();
    for legend in components
        .iter()
        .filter(|c| c.is_shown())
        .filter_map(|c| c.legend())
    {
        if !out.iter().any(|l| l.title == legend.title) {
            out.push(legend);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::geo::LngLat;
    use layers::{DistrictsLayer, ProvincesLayer, StationsLayer};
    use map::HeadlessMap;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn hidden_and_unmounted_components_contribute_nothing() {
        let mut map = HeadlessMap::ready(LngLat::new(30.0, -2.0), 8.0);
        let mut provinces = ProvincesLayer::new();
        let mut districts = DistrictsLayer::new();
        let stations = StationsLayer::default();

        let fc = |name: &str| {
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [30.0, -2.0] },
                    "properties": { "name": name, "mean_aqi": 20 }
                }]
            })
        };
        let p = Arc::new(serde_json::from_value(fc("North")).expect("provinces"));
        let d = Arc::new(serde_json::from_value(fc("Gasabo")).expect("districts"));
        provinces.update(&mut map, Some(&p), true).expect("provinces");
        districts.update(&mut map, Some(&d), false).expect("districts");

        let legends = visible_legends(&[&provinces, &districts, &stations]);
        assert_eq!(
            legends.iter().map(|l| l.title.as_str()).collect::<Vec<_>>(),
            vec!["Air Quality Index"]
        );

        districts.update(&mut map, Some(&d), true).expect("show");
        assert_eq!(visible_legends(&[&provinces, &districts, &stations]).len(), 1);
    }
}
