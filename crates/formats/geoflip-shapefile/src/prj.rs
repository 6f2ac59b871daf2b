//! `.prj` (ESRI WKT) handling.
//!
//! Reading recognises an explicit `AUTHORITY["EPSG",...]` / `ID["EPSG",...]`
//! clause first and falls back to the well-known ESRI names for WGS 84,
//! Web Mercator, WGS 84 UTM zones and the Australian GDA94/GDA2020 datums with
//! their MGA zones. Writing produces ESRI WKT for the same set of codes.

const WGS84_GEOGCS: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";
const GDA94_GEOGCS: &str = "GEOGCS[\"GCS_GDA_1994\",DATUM[\"D_GDA_1994\",SPHEROID[\"GRS_1980\",6378137.0,298.257222101]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";
const GDA2020_GEOGCS: &str = "GEOGCS[\"GCS_GDA2020\",DATUM[\"D_GDA2020\",SPHEROID[\"GRS_1980\",6378137.0,298.257222101]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";

const MGA94_ZONES: std::ops::RangeInclusive<u32> = 48..=58;
const MGA2020_ZONES: std::ops::RangeInclusive<u32> = 46..=59;

/// Resolve the EPSG code described by `.prj` text.
#[must_use]
pub fn epsg_from_prj(text: &str) -> Option<u32> {
    authority_code(text).or_else(|| esri_name_code(text))
}

fn authority_code(text: &str) -> Option<u32> {
    let upper = text.to_ascii_uppercase();
    // The outermost CRS carries the last authority clause.
    ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","]
        .iter()
        .filter_map(|marker| upper.rfind(marker).map(|pos| (pos, marker.len())))
        .max_by_key(|(pos, _)| *pos)
        .and_then(|(pos, len)| {
            let digits: String = upper[pos + len..]
                .trim_start_matches(['"', ' '])
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
}

fn esri_name_code(text: &str) -> Option<u32> {
    let text = text.trim();
    let (keyword, rest) = text.split_once('[')?;
    let name = rest.strip_prefix('"')?.split('"').next()?;
    let name = name.replace([' ', '-'], "_").to_ascii_uppercase();

    match keyword.trim().to_ascii_uppercase().as_str() {
        "GEOGCS" => match name.as_str() {
            "GCS_WGS_1984" | "WGS_84" | "WGS84" => Some(4326),
            "GCS_GDA_1994" | "GDA94" => Some(4283),
            "GCS_GDA2020" | "GDA2020" => Some(7844),
            _ => None,
        },
        "PROJCS" => projected_name_code(&name),
        _ => None,
    }
}

fn projected_name_code(name: &str) -> Option<u32> {
    if name.starts_with("WGS_1984_WEB_MERCATOR") {
        return Some(3857);
    }
    if let Some(zone) = name.strip_prefix("WGS_1984_UTM_ZONE_") {
        let (number, hemisphere) = zone.split_at(zone.len().checked_sub(1)?);
        let number: u32 = number.parse().ok()?;
        if !(1..=60).contains(&number) {
            return None;
        }
        return match hemisphere {
            "N" => Some(32600 + number),
            "S" => Some(32700 + number),
            _ => None,
        };
    }
    if let Some(zone) = name.strip_prefix("GDA_1994_MGA_ZONE_") {
        let number: u32 = zone.parse().ok()?;
        return MGA94_ZONES.contains(&number).then_some(28300 + number);
    }
    if let Some(zone) = name.strip_prefix("GDA2020_MGA_ZONE_") {
        let number: u32 = zone.parse().ok()?;
        return MGA2020_ZONES.contains(&number).then_some(7800 + number);
    }
    None
}

/// ESRI WKT for the codes Geoflip can describe, `None` otherwise.
#[must_use]
pub fn prj_for_epsg(code: u32) -> Option<String> {
    match code {
        4326 => Some(WGS84_GEOGCS.to_string()),
        4283 => Some(GDA94_GEOGCS.to_string()),
        7844 => Some(GDA2020_GEOGCS.to_string()),
        3857 => Some(format!(
            "PROJCS[\"WGS_1984_Web_Mercator_Auxiliary_Sphere\",{WGS84_GEOGCS},\
             PROJECTION[\"Mercator_Auxiliary_Sphere\"],PARAMETER[\"False_Easting\",0.0],\
             PARAMETER[\"False_Northing\",0.0],PARAMETER[\"Central_Meridian\",0.0],\
             PARAMETER[\"Standard_Parallel_1\",0.0],PARAMETER[\"Auxiliary_Sphere_Type\",0.0],\
             UNIT[\"Meter\",1.0]]"
        )),
        32601..=32660 => Some(transverse_mercator(
            &format!("WGS_1984_UTM_Zone_{}N", code - 32600),
            WGS84_GEOGCS,
            code - 32600,
            0.0,
        )),
        32701..=32760 => Some(transverse_mercator(
            &format!("WGS_1984_UTM_Zone_{}S", code - 32700),
            WGS84_GEOGCS,
            code - 32700,
            10_000_000.0,
        )),
        c if (28300..28400).contains(&c) && MGA94_ZONES.contains(&(c - 28300)) => {
            Some(transverse_mercator(
                &format!("GDA_1994_MGA_Zone_{}", c - 28300),
                GDA94_GEOGCS,
                c - 28300,
                10_000_000.0,
            ))
        },
        c if (7800..7900).contains(&c) && MGA2020_ZONES.contains(&(c - 7800)) => {
            Some(transverse_mercator(
                &format!("GDA2020_MGA_Zone_{}", c - 7800),
                GDA2020_GEOGCS,
                c - 7800,
                10_000_000.0,
            ))
        },
        _ => None,
    }
}

fn transverse_mercator(name: &str, geogcs: &str, zone: u32, false_northing: f64) -> String {
    let central_meridian = f64::from(zone) * 6.0 - 183.0;
    format!(
        "PROJCS[\"{name}\",{geogcs},PROJECTION[\"Transverse_Mercator\"],\
         PARAMETER[\"False_Easting\",500000.0],PARAMETER[\"False_Northing\",{false_northing:.1}],\
         PARAMETER[\"Central_Meridian\",{central_meridian:.1}],PARAMETER[\"Scale_Factor\",0.9996],\
         PARAMETER[\"Latitude_Of_Origin\",0.0],UNIT[\"Meter\",1.0]]"
    )
}
