//! GIS exports of a completed scan: rasters, point tables, KML, GeoJSON and DXF

use crate::core::georef::Georef;
use crate::core::roi::Roi;
use crate::core::scan::ScanResult;
use crate::types::{GeoAnomaly, GeoResult, Heatmap, Polarity};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// KML colors (aabbggrr)
const KML_ROI_FILL: &str = "3cff0000";
const KML_POS_ICON: &str = "ff0000ff";
const KML_NEG_ICON: &str = "ff008000";

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    GeoTiff,
    EsriAscii,
    SurferGrd,
    XyzCsv,
    Kml,
    GeoJson,
    Dxf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 7] = [
        ExportFormat::GeoTiff,
        ExportFormat::EsriAscii,
        ExportFormat::SurferGrd,
        ExportFormat::XyzCsv,
        ExportFormat::Kml,
        ExportFormat::GeoJson,
        ExportFormat::Dxf,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::GeoTiff => "GeoTIFF",
            ExportFormat::EsriAscii => "ESRI_ASCII",
            ExportFormat::SurferGrd => "Surfer_GRD",
            ExportFormat::XyzCsv => "XYZ_CSV",
            ExportFormat::Kml => "KML",
            ExportFormat::GeoJson => "GeoJSON",
            ExportFormat::Dxf => "DXF",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::GeoTiff => "heatmap.tif",
            ExportFormat::EsriAscii => "heatmap.asc",
            ExportFormat::SurferGrd => "heatmap.grd",
            ExportFormat::XyzCsv => "anomalies_xyz.csv",
            ExportFormat::Kml => "roi_and_anomalies.kml",
            ExportFormat::GeoJson => "roi_and_anomalies.geojson",
            ExportFormat::Dxf => "roi_and_anomalies.dxf",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Write every available format into `dir`, creating it if needed.
///
/// GeoTIFF needs the `geotiff` feature and is skipped without it.
pub fn export_all<P: AsRef<Path>>(
    result: &ScanResult,
    dir: P,
) -> GeoResult<BTreeMap<ExportFormat, PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    log::info!("Exporting scan results to {}", dir.display());

    let mut written = BTreeMap::new();
    for format in ExportFormat::ALL {
        let path = dir.join(format.file_name());
        let done = match format {
            ExportFormat::GeoTiff => export_geotiff(&result.heatmap, &result.georef, &path)?,
            ExportFormat::EsriAscii => {
                export_esri_ascii_grid(&result.heatmap, &result.georef, &path)?;
                true
            }
            ExportFormat::SurferGrd => {
                export_surfer_dsaa_grid(&result.heatmap, &result.georef, &path)?;
                true
            }
            ExportFormat::XyzCsv => {
                export_xyz_csv(&result.anomaly_points, &path)?;
                true
            }
            ExportFormat::Kml => {
                export_kml(&result.roi, &result.anomaly_points, &path)?;
                true
            }
            ExportFormat::GeoJson => {
                export_geojson(&result.roi, &result.anomaly_points, &path)?;
                true
            }
            ExportFormat::Dxf => {
                export_dxf(&result.roi, &result.anomaly_points, &path)?;
                true
            }
        };
        if done {
            log::debug!("Wrote {} -> {}", format, path.display());
            written.insert(format, path);
        }
    }

    Ok(written)
}

/// Single-band float32 GeoTIFF, EPSG:4326, LZW
#[cfg(feature = "geotiff")]
pub fn export_geotiff(heatmap: &Heatmap, georef: &Georef, path: &Path) -> GeoResult<bool> {
    use gdal::raster::{Buffer, RasterCreationOption};
    use gdal::spatial_ref::SpatialRef;
    use gdal::DriverManager;

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = heatmap.dim();
    let options = [RasterCreationOption { key: "COMPRESS", value: "LZW" }];

    let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
        path,
        width as isize,
        height as isize,
        1,
        &options,
    )?;
    dataset.set_geo_transform(&georef.geo_transform().to_array())?;
    dataset.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<f32> = heatmap.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;

    Ok(true)
}

#[cfg(not(feature = "geotiff"))]
pub fn export_geotiff(_heatmap: &Heatmap, _georef: &Georef, path: &Path) -> GeoResult<bool> {
    log::warn!("GeoTIFF export needs the `geotiff` feature, skipping {}", path.display());
    Ok(false)
}

/// ESRI ASCII grid, lower-left origin
pub fn export_esri_ascii_grid(heatmap: &Heatmap, georef: &Georef, path: &Path) -> GeoResult<()> {
    let (height, width) = heatmap.dim();
    let (cell_x, cell_y) = georef.cell_size();
    let cellsize = (cell_x + cell_y) / 2.0;

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "ncols         {}", width)?;
    writeln!(out, "nrows         {}", height)?;
    writeln!(out, "xllcorner     {}", georef.lon_min)?;
    writeln!(out, "yllcorner     {}", georef.lat_min)?;
    writeln!(out, "cellsize      {}", cellsize)?;
    writeln!(out, "NODATA_value  -9999")?;

    // ESRI grids list the northern row first
    for r in (0..height).rev() {
        writeln!(out, "{}", join_values(heatmap.row(r).iter()))?;
    }
    out.flush()?;
    Ok(())
}

/// Surfer 6 ASCII (DSAA) grid, 10 values per line
pub fn export_surfer_dsaa_grid(heatmap: &Heatmap, georef: &Georef, path: &Path) -> GeoResult<()> {
    let (height, width) = heatmap.dim();
    let zmin = heatmap.iter().cloned().fold(f32::INFINITY, f32::min);
    let zmax = heatmap.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "DSAA")?;
    writeln!(out, "{} {}", width, height)?;
    writeln!(out, "{} {}", georef.lon_min, georef.lon_max)?;
    writeln!(out, "{} {}", georef.lat_min, georef.lat_max)?;
    writeln!(out, "{} {}", zmin as f64, zmax as f64)?;

    for r in (0..height).rev() {
        let values: Vec<f32> = heatmap.row(r).iter().cloned().collect();
        for chunk in values.chunks(10) {
            writeln!(out, "{}", join_values(chunk.iter()))?;
        }
    }
    out.flush()?;
    Ok(())
}

fn join_values<'a, I: Iterator<Item = &'a f32>>(values: I) -> String {
    values
        .map(|v| format!("{:.6}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// XYZ point table
pub fn export_xyz_csv(points: &[GeoAnomaly], path: &Path) -> GeoResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "x_lon,y_lat,z_score,polarity,z_rel,depth_m,volume_m3")?;
    for p in points {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            p.lon, p.lat, p.point.score, p.point.polarity, p.point.z_rel, p.depth_m, p.volume_m3
        )?;
    }
    out.flush()?;
    Ok(())
}

fn ring_coordinates(roi: &Roi) -> String {
    roi.polygon
        .iter()
        .map(|(lon, lat)| format!("{},{},0", lon, lat))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> GeoResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_color_style<W: Write>(writer: &mut Writer<W>, style: &str, color: &str) -> GeoResult<()> {
    writer.write_event(Event::Start(BytesStart::new("Style")))?;
    writer.write_event(Event::Start(BytesStart::new(style)))?;
    write_text_element(writer, "color", color)?;
    writer.write_event(Event::End(BytesEnd::new(style)))?;
    writer.write_event(Event::End(BytesEnd::new("Style")))?;
    Ok(())
}

/// KML document: ROI polygon plus one colored placemark per anomaly
pub fn export_kml(roi: &Roi, points: &[GeoAnomaly], path: &Path) -> GeoResult<()> {
    let mut writer = Writer::new_with_indent(BufWriter::new(File::create(path)?), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut kml = BytesStart::new("kml");
    kml.push_attribute(("xmlns", "http://www.opengis.net/kml/2.2"));
    writer.write_event(Event::Start(kml))?;
    writer.write_event(Event::Start(BytesStart::new("Document")))?;

    // ROI polygon
    writer.write_event(Event::Start(BytesStart::new("Placemark")))?;
    write_text_element(&mut writer, "name", "ROI")?;
    write_color_style(&mut writer, "PolyStyle", KML_ROI_FILL)?;
    writer.write_event(Event::Start(BytesStart::new("Polygon")))?;
    writer.write_event(Event::Start(BytesStart::new("outerBoundaryIs")))?;
    writer.write_event(Event::Start(BytesStart::new("LinearRing")))?;
    write_text_element(&mut writer, "coordinates", &ring_coordinates(roi))?;
    writer.write_event(Event::End(BytesEnd::new("LinearRing")))?;
    writer.write_event(Event::End(BytesEnd::new("outerBoundaryIs")))?;
    writer.write_event(Event::End(BytesEnd::new("Polygon")))?;
    writer.write_event(Event::End(BytesEnd::new("Placemark")))?;

    for (i, p) in points.iter().enumerate() {
        let color = match p.point.polarity {
            Polarity::Pos => KML_POS_ICON,
            Polarity::Neg => KML_NEG_ICON,
        };
        writer.write_event(Event::Start(BytesStart::new("Placemark")))?;
        write_text_element(&mut writer, "name", &format!("A{} {}", i + 1, p.point.polarity))?;
        write_text_element(
            &mut writer,
            "description",
            &format!("score={}\nz_rel={}", p.point.score, p.point.z_rel),
        )?;
        write_color_style(&mut writer, "IconStyle", color)?;
        writer.write_event(Event::Start(BytesStart::new("Point")))?;
        write_text_element(&mut writer, "coordinates", &format!("{},{},0", p.lon, p.lat))?;
        writer.write_event(Event::End(BytesEnd::new("Point")))?;
        writer.write_event(Event::End(BytesEnd::new("Placemark")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("Document")))?;
    writer.write_event(Event::End(BytesEnd::new("kml")))?;
    writer.into_inner().flush()?;
    Ok(())
}

/// GeoJSON FeatureCollection: ROI polygon first, then one point per anomaly
pub fn export_geojson(roi: &Roi, points: &[GeoAnomaly], path: &Path) -> GeoResult<()> {
    let ring: Vec<[f64; 2]> = roi.polygon.iter().map(|&(lon, lat)| [lon, lat]).collect();
    let mut features = vec![json!({
        "type": "Feature",
        "properties": {"name": "ROI"},
        "geometry": {"type": "Polygon", "coordinates": [ring]},
    })];

    features.extend(points.iter().enumerate().map(|(i, p)| {
        json!({
            "type": "Feature",
            "properties": {
                "name": format!("A{}", i + 1),
                "polarity": p.point.polarity,
                "score": p.point.score,
                "z_rel": p.point.z_rel,
            },
            "geometry": {"type": "Point", "coordinates": [p.lon, p.lat]},
        })
    }));

    let collection = json!({"type": "FeatureCollection", "features": features});
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, &collection)?;
    out.flush()?;
    Ok(())
}

/// One DXF group code / value pair
fn dxf_pair<W: Write>(
    out: &mut W,
    code: i32,
    value: impl std::fmt::Display,
) -> std::io::Result<()> {
    writeln!(out, "{:>3}", code)?;
    writeln!(out, "{}", value)
}

fn dxf_layer<W: Write>(out: &mut W, name: &str, color: i32) -> std::io::Result<()> {
    dxf_pair(out, 0, "LAYER")?;
    dxf_pair(out, 2, name)?;
    dxf_pair(out, 70, 0)?;
    dxf_pair(out, 62, color)?;
    dxf_pair(out, 6, "CONTINUOUS")
}

fn polarity_layer(polarity: Polarity) -> &'static str {
    match polarity {
        Polarity::Pos => "ANOM_POS",
        Polarity::Neg => "ANOM_NEG",
    }
}

/// ASCII DXF (AC1009) with the ROI as a closed polyline and points per polarity layer
pub fn export_dxf(roi: &Roi, points: &[GeoAnomaly], path: &Path) -> GeoResult<()> {
    let mut out = BufWriter::new(File::create(path)?);

    dxf_pair(&mut out, 0, "SECTION")?;
    dxf_pair(&mut out, 2, "HEADER")?;
    dxf_pair(&mut out, 9, "$ACADVER")?;
    dxf_pair(&mut out, 1, "AC1009")?;
    dxf_pair(&mut out, 0, "ENDSEC")?;

    dxf_pair(&mut out, 0, "SECTION")?;
    dxf_pair(&mut out, 2, "TABLES")?;
    dxf_pair(&mut out, 0, "TABLE")?;
    dxf_pair(&mut out, 2, "LAYER")?;
    dxf_pair(&mut out, 70, 3)?;
    dxf_layer(&mut out, "ROI", 5)?;
    dxf_layer(&mut out, "ANOM_POS", 1)?;
    dxf_layer(&mut out, "ANOM_NEG", 3)?;
    dxf_pair(&mut out, 0, "ENDTAB")?;
    dxf_pair(&mut out, 0, "ENDSEC")?;

    dxf_pair(&mut out, 0, "SECTION")?;
    dxf_pair(&mut out, 2, "ENTITIES")?;

    // The closed flag draws the last segment, so the repeated vertex is skipped
    dxf_pair(&mut out, 0, "POLYLINE")?;
    dxf_pair(&mut out, 8, "ROI")?;
    dxf_pair(&mut out, 66, 1)?;
    dxf_pair(&mut out, 70, 1)?;
    for &(lon, lat) in &roi.polygon[..roi.vertex_count()] {
        dxf_pair(&mut out, 0, "VERTEX")?;
        dxf_pair(&mut out, 8, "ROI")?;
        dxf_pair(&mut out, 10, lon)?;
        dxf_pair(&mut out, 20, lat)?;
        dxf_pair(&mut out, 30, 0.0)?;
    }
    dxf_pair(&mut out, 0, "SEQEND")?;
    dxf_pair(&mut out, 8, "ROI")?;

    for p in points {
        dxf_pair(&mut out, 0, "POINT")?;
        dxf_pair(&mut out, 8, polarity_layer(p.point.polarity))?;
        dxf_pair(&mut out, 10, p.lon)?;
        dxf_pair(&mut out, 20, p.lat)?;
        dxf_pair(&mut out, 30, 0.0)?;
    }

    dxf_pair(&mut out, 0, "ENDSEC")?;
    dxf_pair(&mut out, 0, "EOF")?;
    out.flush()?;
    Ok(())
}
