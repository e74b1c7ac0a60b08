// Result Exporter - fixed-schema CSV export of a run

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{DustError, DustResult};
use crate::population_model::{Material, SourceFamily};
use crate::sampler::ParticleResult;

/// Column order of the tabular export
pub const TABULAR_COLUMNS: [&str; 17] = [
    "source_family",
    "r_m",
    "m_kg",
    "material",
    "rho_kg_m3",
    "v_inf_m_s",
    "v_entry_m_s",
    "incoming_vector_x",
    "incoming_vector_y",
    "incoming_vector_z",
    "impact_parameter_b_m",
    "entry_angle_deg",
    "lat_deg",
    "lon_deg",
    "em_flag",
    "high_energy_flag",
    "selected_for_atmosphere",
];

/// One flattened CSV row; field order matches [`TABULAR_COLUMNS`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularRow {
    pub source_family: SourceFamily,
    pub r_m: f64,
    pub m_kg: f64,
    pub material: Material,
    pub rho_kg_m3: f64,
    pub v_inf_m_s: f64,
    pub v_entry_m_s: f64,
    pub incoming_vector_x: f64,
    pub incoming_vector_y: f64,
    pub incoming_vector_z: f64,
    pub impact_parameter_b_m: f64,
    pub entry_angle_deg: f64,
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub em_flag: bool,
    pub high_energy_flag: bool,
    pub selected_for_atmosphere: bool,
}

impl From<&ParticleResult> for TabularRow {
    fn from(p: &ParticleResult) -> Self {
        Self {
            source_family: p.source_family,
            r_m: p.r,
            m_kg: p.m,
            material: p.material,
            rho_kg_m3: p.rho,
            v_inf_m_s: p.v_inf,
            v_entry_m_s: p.v_entry,
            incoming_vector_x: p.incoming_unit_vector.x,
            incoming_vector_y: p.incoming_unit_vector.y,
            incoming_vector_z: p.incoming_unit_vector.z,
            impact_parameter_b_m: p.impact_parameter_b,
            entry_angle_deg: p.entry_angle,
            lat_deg: p.lat,
            lon_deg: p.lon,
            em_flag: p.em_flag,
            high_energy_flag: p.high_energy_flag,
            selected_for_atmosphere: p.selected_for_atmosphere,
        }
    }
}

/// Write header plus one row per result, in generation order.
///
/// Floats use the shortest representation that parses back to the same f64.
pub fn write_tabular<W: Write>(results: &[ParticleResult], writer: W) -> DustResult<()> {
    if results.is_empty() {
        return Err(DustError::EmptyResultSet);
    }
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(TABULAR_COLUMNS)?;
    for particle in results {
        csv_writer.serialize(TabularRow::from(particle))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_tabular(results: &[ParticleResult], path: impl AsRef<Path>) -> DustResult<()> {
    if results.is_empty() {
        return Err(DustError::EmptyResultSet);
    }
    let path = path.as_ref();
    let file = File::create(path)?;
    write_tabular(results, BufWriter::new(file))?;
    log::info!("Exported {} rows to {}", results.len(), path.display());
    Ok(())
}

pub fn read_tabular_from<R: Read>(reader: R) -> DustResult<Vec<TabularRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    if headers.iter().ne(TABULAR_COLUMNS.iter().copied()) {
        return Err(DustError::Schema(format!(
            "unexpected CSV header: {:?}",
            headers
        )));
    }
    let rows = csv_reader
        .deserialize()
        .collect::<Result<Vec<TabularRow>, csv::Error>>()?;
    Ok(rows)
}

pub fn read_tabular(path: impl AsRef<Path>) -> DustResult<Vec<TabularRow>> {
    read_tabular_from(File::open(path)?)
}

// =============================================================================
// TESTS
// =============================================================================
