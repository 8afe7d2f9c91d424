use serde::Serialize;
use tracing::{debug, info};

use crate::domain::BoundingBox;
use crate::error::FirmsError;

pub const ALL_SUBDIVISIONS: &str = "All States";

pub const LARGE_COUNTRIES: &[&str] = &[
    "United States",
    "China",
    "Russia",
    "Canada",
    "Brazil",
    "Australia",
    "India",
];

/// Countries fetched as several longitude bands instead of one box.
const PARTITIONED_COUNTRIES: &[(&str, &[&str])] = &[(
    "Russia",
    &[
        "19.25,41.151,60.0,81.2",
        "60.0,41.151,120.0,81.2",
        "120.0,41.151,180.0,81.2",
    ],
)];

const COUNTRY_BBOXES: &[(&str, &str)] = &[
    ("Afghanistan", "60.52,29.31,75.15,38.48"),
    ("United States", "-125.0,24.0,-66.0,50.0"),
    ("Brazil", "-73.0,-33.0,-35.0,5.0"),
    ("Australia", "113.0,-44.0,154.0,-10.0"),
    ("India", "68.0,7.0,97.0,37.0"),
    ("China", "73.0,18.0,135.0,53.0"),
    ("Canada", "-141.0,41.7,-52.6,83.0"),
    ("Russia", "19.25,41.151,180.0,81.2"),
    ("Indonesia", "95.0,-11.0,141.0,6.0"),
    ("Mongolia", "87.76,41.59,119.93,52.15"),
    ("Kazakhstan", "46.46,40.57,87.36,55.45"),
    ("Mexico", "-118.4,14.5,-86.4,32.7"),
    ("Argentina", "-73.6,-55.1,-53.6,-21.8"),
    ("Chile", "-75.6,-55.9,-66.9,-17.5"),
    ("South Africa", "16.3,-34.8,32.9,-22.1"),
    ("New Zealand", "166.3,-47.3,178.6,-34.4"),
    ("Thailand", "97.3,5.6,105.6,20.5"),
    ("Vietnam", "102.1,8.4,109.5,23.4"),
    ("Malaysia", "99.6,0.8,119.3,7.4"),
    ("Myanmar", "92.2,9.8,101.2,28.5"),
    ("Philippines", "116.9,4.6,126.6,19.6"),
    ("Papua New Guinea", "140.8,-11.7,155.6,-1.3"),
    ("Greece", "19.4,34.8,28.3,41.8"),
    ("Turkey", "26.0,36.0,45.0,42.0"),
    ("Spain", "-9.3,36.0,4.3,43.8"),
    ("Portugal", "-9.5,37.0,-6.2,42.2"),
    ("Italy", "6.6,35.5,18.5,47.1"),
    ("France", "-5.1,41.3,9.6,51.1"),
    ("Germany", "5.9,47.3,15.0,55.1"),
    ("Ukraine", "22.1,44.4,40.2,52.4"),
    ("Sweden", "11.1,55.3,24.2,69.1"),
    ("Norway", "4.5,58.0,31.1,71.2"),
    ("Finland", "20.6,59.8,31.6,70.1"),
    ("Japan", "129.5,31.4,145.8,45.5"),
    ("South Korea", "126.1,33.1,129.6,38.6"),
    ("North Korea", "124.2,37.7,130.7,43.0"),
    ("Iran", "44.0,25.1,63.3,39.8"),
    ("Iraq", "38.8,29.1,48.8,37.4"),
    ("Saudi Arabia", "34.6,16.3,55.7,32.2"),
    ("Egypt", "24.7,22.0,36.9,31.7"),
    ("Libya", "9.3,19.5,25.2,33.2"),
    ("Algeria", "-8.7,19.1,12.0,37.1"),
    ("Morocco", "-13.2,27.7,-1.0,35.9"),
    ("Sudan", "21.8,8.7,38.6,22.2"),
    ("South Sudan", "23.4,3.5,35.9,12.2"),
    ("Ethiopia", "33.0,3.4,47.9,14.8"),
    ("Kenya", "33.9,-4.7,41.9,5.0"),
    ("Tanzania", "29.3,-11.7,40.4,-1.0"),
    ("Uganda", "29.5,-1.4,35.0,4.2"),
    ("Nigeria", "2.7,4.3,14.7,13.9"),
    ("Ghana", "-3.3,4.7,1.2,11.2"),
    ("Ivory Coast", "-8.6,4.4,-2.5,10.7"),
    ("Somalia", "40.9,-1.7,51.4,11.9"),
    ("Democratic Republic of the Congo", "12.2,-13.5,31.3,5.3"),
    ("Angola", "11.7,-18.0,24.1,-4.4"),
    ("Namibia", "11.7,-28.9,25.3,-16.9"),
    ("Zambia", "22.0,-18.0,33.7,-8.2"),
    ("Zimbabwe", "25.2,-22.4,33.1,-15.6"),
    ("Mozambique", "30.2,-26.9,40.9,-10.5"),
    ("Madagascar", "43.2,-25.6,50.5,-11.9"),
    ("Colombia", "-79.0,-4.2,-66.9,12.5"),
    ("Venezuela", "-73.4,0.6,-59.8,12.2"),
    ("Peru", "-81.3,-18.4,-68.7,-0.0"),
    ("Bolivia", "-69.6,-22.9,-57.5,-9.7"),
    ("Paraguay", "-62.6,-27.6,-54.3,-19.3"),
    ("Uruguay", "-58.4,-34.9,-53.1,-30.1"),
    ("Ecuador", "-81.0,-5.0,-75.2,1.4"),
    ("Guatemala", "-92.2,13.7,-88.2,17.8"),
    ("Honduras", "-89.4,12.9,-83.1,16.5"),
    ("Cuba", "-85.0,19.8,-74.1,23.2"),
    ("Bangladesh", "88.0,20.6,92.7,26.6"),
    ("Nepal", "80.0,26.3,88.2,30.4"),
    ("Sri Lanka", "79.6,5.9,81.9,9.8"),
    ("Pakistan", "61.0,23.5,77.8,37.1"),
    ("Uzbekistan", "56.0,37.2,73.1,45.6"),
    ("Cambodia", "102.3,10.4,107.6,14.7"),
    ("Laos", "100.1,13.9,107.7,22.5"),
    ("Israel", "34.2,29.5,35.9,33.3"),
    ("Syria", "35.7,32.3,42.4,37.3"),
    ("Cyprus", "32.0,34.6,34.6,35.7"),
    ("Ireland", "-10.5,51.4,-6.0,55.4"),
    ("United Kingdom", "-8.2,49.9,1.8,58.7"),
    ("Austria", "9.5,46.4,17.2,49.0"),
    ("Poland", "14.1,49.0,24.2,54.8"),
    ("Romania", "20.3,43.6,29.7,48.3"),
    ("Bulgaria", "22.4,41.2,28.6,44.2"),
    ("Croatia", "13.5,42.4,19.4,46.6"),
    ("Albania", "19.3,39.6,21.1,42.7"),
    ("North Macedonia", "20.4,40.8,23.0,42.4"),
];

const US_STATE_BBOXES: &[(&str, &str)] = &[
    ("Alabama", "-88.5,30.1,-84.9,35.0"),
    ("Alaska", "-179.2,51.2,-129.9,71.4"),
    ("Arizona", "-114.8,31.3,-109.0,37.0"),
    ("Arkansas", "-94.6,33.0,-89.6,36.5"),
    ("California", "-124.5,32.5,-114.1,42.0"),
    ("Colorado", "-109.1,37.0,-102.0,41.0"),
    ("Connecticut", "-73.7,41.0,-71.8,42.1"),
    ("Delaware", "-75.8,38.4,-75.0,39.8"),
    ("Florida", "-87.6,24.5,-80.0,31.0"),
    ("Georgia", "-85.6,30.4,-80.8,35.0"),
    ("Hawaii", "-160.3,18.9,-154.8,22.2"),
    ("Idaho", "-117.2,42.0,-111.0,49.0"),
    ("Illinois", "-91.5,37.0,-87.5,42.5"),
    ("Indiana", "-88.1,37.8,-84.8,41.8"),
    ("Iowa", "-96.6,40.4,-90.1,43.5"),
    ("Kansas", "-102.1,37.0,-94.6,40.0"),
    ("Kentucky", "-89.6,36.5,-81.9,39.1"),
    ("Louisiana", "-94.0,28.9,-88.8,33.0"),
    ("Maine", "-71.1,43.1,-66.9,47.5"),
    ("Maryland", "-79.5,37.9,-75.0,39.7"),
    ("Massachusetts", "-73.5,41.2,-69.9,42.9"),
    ("Michigan", "-90.4,41.7,-82.4,48.3"),
    ("Minnesota", "-97.2,43.5,-89.5,49.4"),
    ("Mississippi", "-91.7,30.2,-88.1,35.0"),
    ("Missouri", "-95.8,36.0,-89.1,40.6"),
    ("Montana", "-116.1,44.4,-104.0,49.0"),
    ("Nebraska", "-104.1,40.0,-95.3,43.0"),
    ("Nevada", "-120.0,35.0,-114.0,42.0"),
    ("New Hampshire", "-72.6,42.7,-70.6,45.3"),
    ("New Jersey", "-75.6,38.9,-73.9,41.4"),
    ("New Mexico", "-109.1,31.3,-103.0,37.0"),
    ("New York", "-79.8,40.5,-71.9,45.0"),
    ("North Carolina", "-84.3,33.8,-75.5,36.6"),
    ("North Dakota", "-104.1,45.9,-96.6,49.0"),
    ("Ohio", "-84.8,38.4,-80.5,42.0"),
    ("Oklahoma", "-103.0,33.6,-94.4,37.0"),
    ("Oregon", "-124.6,42.0,-116.5,46.3"),
    ("Pennsylvania", "-80.5,39.7,-74.7,42.3"),
    ("Rhode Island", "-71.9,41.1,-71.1,42.0"),
    ("South Carolina", "-83.4,32.0,-78.5,35.2"),
    ("South Dakota", "-104.1,42.5,-96.4,45.9"),
    ("Tennessee", "-90.3,35.0,-81.6,36.7"),
    ("Texas", "-106.6,25.8,-93.5,36.5"),
    ("Utah", "-114.1,37.0,-109.0,42.0"),
    ("Vermont", "-73.4,42.7,-71.5,45.0"),
    ("Virginia", "-83.7,36.5,-75.2,39.5"),
    ("Washington", "-124.8,45.5,-116.9,49.0"),
    ("West Virginia", "-82.6,37.2,-77.7,40.6"),
    ("Wisconsin", "-92.9,42.5,-86.8,47.1"),
    ("Wyoming", "-111.1,41.0,-104.1,45.0"),
];

pub trait RegionTables: Send + Sync {
    fn country_bbox(&self, country: &str) -> Option<BoundingBox>;
    fn subdivision_bbox(&self, country: &str, subdivision: &str) -> Option<BoundingBox>;
    fn is_large(&self, country: &str) -> bool;
    fn partition(&self, country: &str) -> Option<Vec<BoundingBox>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRegions;

impl BuiltinRegions {
    pub fn countries(&self) -> impl Iterator<Item = &'static str> {
        COUNTRY_BBOXES.iter().map(|(name, _)| *name)
    }

    pub fn subdivisions(&self, country: &str) -> Vec<&'static str> {
        if country.trim().eq_ignore_ascii_case("United States") {
            US_STATE_BBOXES.iter().map(|(name, _)| *name).collect()
        } else {
            Vec::new()
        }
    }
}

fn lookup(table: &[(&str, &str)], name: &str) -> Option<BoundingBox> {
    table
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name.trim()))
        .and_then(|(_, bbox)| bbox.parse().ok())
}

impl RegionTables for BuiltinRegions {
    fn country_bbox(&self, country: &str) -> Option<BoundingBox> {
        lookup(COUNTRY_BBOXES, country)
    }

    fn subdivision_bbox(&self, country: &str, subdivision: &str) -> Option<BoundingBox> {
        if country.eq_ignore_ascii_case("United States") {
            lookup(US_STATE_BBOXES, subdivision)
        } else {
            None
        }
    }

    fn is_large(&self, country: &str) -> bool {
        LARGE_COUNTRIES
            .iter()
            .any(|name| name.eq_ignore_ascii_case(country.trim()))
    }

    fn partition(&self, country: &str) -> Option<Vec<BoundingBox>> {
        PARTITIONED_COUNTRIES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(country.trim()))
            .map(|(_, boxes)| boxes.iter().filter_map(|bbox| bbox.parse().ok()).collect())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionRequest {
    pub country: Option<String>,
    pub subdivision: Option<String>,
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionBoxes {
    boxes: Vec<BoundingBox>,
    /// fetches for large regions use the extended timeout
    pub large: bool,
}

impl RegionBoxes {
    pub fn single(bbox: BoundingBox, large: bool) -> Self {
        Self {
            boxes: vec![bbox],
            large,
        }
    }

    pub fn partitioned(boxes: Vec<BoundingBox>, large: bool) -> Option<Self> {
        if boxes.is_empty() {
            return None;
        }
        Some(Self { boxes, large })
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Box covering every partition, used for the first geofence stage.
    pub fn envelope(&self) -> BoundingBox {
        let first = self.boxes[0];
        self.boxes[1..]
            .iter()
            .fold(first, |acc, bbox| acc.union(bbox))
    }
}

pub struct RegionResolver<T: RegionTables = BuiltinRegions> {
    tables: T,
}

impl Default for RegionResolver<BuiltinRegions> {
    fn default() -> Self {
        Self::new(BuiltinRegions)
    }
}

impl<T: RegionTables> RegionResolver<T> {
    pub fn new(tables: T) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &T {
        &self.tables
    }

    pub fn resolve(&self, request: &RegionRequest) -> Result<RegionBoxes, FirmsError> {
        if let Some(bbox) = request.bbox {
            debug!(%bbox, "using explicit bounding box");
            return Ok(RegionBoxes::single(bbox, false));
        }

        let country = request
            .country
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| FirmsError::UnknownRegion("no country or bounding box given".to_string()))?;

        if let Some(subdivision) = request
            .subdivision
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != ALL_SUBDIVISIONS)
        {
            let bbox = self
                .tables
                .subdivision_bbox(country, subdivision)
                .ok_or_else(|| FirmsError::UnknownRegion(format!("{country} / {subdivision}")))?;
            info!(subdivision, %bbox, "using subdivision bounding box");
            return Ok(RegionBoxes::single(bbox, false));
        }

        let large = self.tables.is_large(country);
        if let Some(boxes) = self
            .tables
            .partition(country)
            .and_then(|boxes| RegionBoxes::partitioned(boxes, large))
        {
            info!(country, parts = boxes.len(), "region is partitioned into sub-boxes");
            return Ok(boxes);
        }

        let bbox = self
            .tables
            .country_bbox(country)
            .ok_or_else(|| FirmsError::UnknownRegion(country.to_string()))?;
        Ok(RegionBoxes::single(bbox, large))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn country(name: &str) -> RegionRequest {
        RegionRequest {
            country: Some(name.to_string()),
            ..RegionRequest::default()
        }
    }

    #[test]
    fn explicit_bbox_wins() {
        let bbox: BoundingBox = "1,2,3,4".parse().unwrap();
        let request = RegionRequest {
            country: Some("Russia".to_string()),
            subdivision: None,
            bbox: Some(bbox),
        };
        let boxes = RegionResolver::default().resolve(&request).unwrap();
        assert_eq!(boxes.boxes(), &[bbox]);
        assert!(!boxes.large);
    }

    #[test]
    fn large_country_single_box() {
        let boxes = RegionResolver::default().resolve(&country("Brazil")).unwrap();
        assert_eq!(boxes.len(), 1);
        assert!(boxes.large);
    }

    #[test]
    fn russia_is_partitioned_by_longitude() {
        let boxes = RegionResolver::default().resolve(&country("Russia")).unwrap();
        assert_eq!(boxes.len(), 3);
        assert!(boxes.large);
        assert_eq!(boxes.boxes()[1].to_string(), "60.0,41.151,120.0,81.2");
        assert_eq!(boxes.envelope().to_string(), "19.25,41.151,180.0,81.2");
    }

    #[test]
    fn us_state_subdivision() {
        let request = RegionRequest {
            country: Some("United States".to_string()),
            subdivision: Some("California".to_string()),
            bbox: None,
        };
        let boxes = RegionResolver::default().resolve(&request).unwrap();
        assert_eq!(boxes.len(), 1);
        assert!(!boxes.large);

        let all = RegionRequest {
            subdivision: Some(ALL_SUBDIVISIONS.to_string()),
            ..request
        };
        let boxes = RegionResolver::default().resolve(&all).unwrap();
        assert!(boxes.large);
    }

    #[test]
    fn unknown_region_fails() {
        assert_matches!(
            RegionResolver::default().resolve(&country("Narnia")),
            Err(FirmsError::UnknownRegion(_))
        );
        assert_matches!(
            RegionResolver::default().resolve(&RegionRequest::default()),
            Err(FirmsError::UnknownRegion(_))
        );
    }
}
