//! Resolution pipeline: reads data files, resolves names, builds a catalog
//! and a populated network manager.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers used by the higher-level loading pipeline.

use crate::catalog::{Catalog, Template};
use crate::schema::{FacilityData, FluidAmount, FluidData, LayoutData, PolicyData};
use aqueduct_core::config::NetworkConfig;
use aqueduct_core::fixed::Volume;
use aqueduct_core::fluid::FluidRegistry;
use aqueduct_core::grid::{Footprint, GridPosition, MAX_FOOTPRINT_SIDE};
use aqueduct_core::id::{FluidType, NodeId, PipeLayer};
use aqueduct_core::manager::NetworkManager;
use aqueduct_core::node::{
    AcceptedTypes, FacilitySpec, FlowPolicy, InputSpec, NodeStatus, OutputSpec,
};
use aqueduct_core::tank::Tank;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A value parsed but cannot be used.
    #[error("invalid value in {file}: {detail}")]
    Invalid { file: PathBuf, detail: String },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    tracing::debug!(file = %path.display(), ?format, "reading data file");

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let table: toml::Value = deserialize_file(path)?;
    let array = table
        .get(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
        .clone();
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Convert a non-negative, finite data value to a [`Volume`].
fn volume(value: f64, file: &Path, what: &str) -> Result<Volume, DataLoadError> {
    if value < 0.0 {
        return Err(DataLoadError::Invalid {
            file: file.to_path_buf(),
            detail: format!("{what} must not be negative, got {value}"),
        });
    }
    Volume::checked_from_num(value).ok_or_else(|| DataLoadError::Invalid {
        file: file.to_path_buf(),
        detail: format!("{what} out of range: {value}"),
    })
}

// ===========================================================================
// Loading pipeline
// ===========================================================================

/// Register every fluid in `fluids.*`, returning the name -> id map.
fn load_fluids(
    dir: &Path,
    registry: &mut FluidRegistry,
) -> Result<HashMap<String, FluidType>, DataLoadError> {
    let path = require_data_file(dir, "fluids")?;
    let fluids: Vec<FluidData> = deserialize_list(&path, "fluids")?;
    let mut by_name = HashMap::new();
    for fluid in fluids {
        check_duplicate(&by_name, &fluid.name, &path)?;
        let id = registry.register(&fluid.name);
        by_name.insert(fluid.name, id);
    }
    Ok(by_name)
}

fn accepted_types(
    names: &[String],
    fluids: &HashMap<String, FluidType>,
    file: &Path,
) -> Result<AcceptedTypes, DataLoadError> {
    if names.is_empty() {
        return Ok(AcceptedTypes::Any);
    }
    let ids = names
        .iter()
        .map(|n| resolve_name(fluids, n, file, "fluid").copied())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AcceptedTypes::Only(ids))
}

fn template_from_data(
    data: &FacilityData,
    fluids: &HashMap<String, FluidType>,
    file: &Path,
) -> Result<Template, DataLoadError> {
    let mut spec = if data.conduit {
        FacilitySpec::pipe()
    } else {
        FacilitySpec::new()
    };
    if let Some(input) = &data.input {
        spec = spec.with_input(InputSpec {
            max_rate: volume(input.max_rate, file, "input max_rate")?,
            accepts: accepted_types(&input.accepts, fluids, file)?,
            policy: match input.policy {
                PolicyData::Demand => FlowPolicy::Demand,
                PolicyData::Constant => FlowPolicy::Constant,
            },
        });
    }
    if let Some(output) = &data.output {
        spec = spec.with_output(OutputSpec {
            rate: volume(output.rate, file, "output rate")?,
            accepts: accepted_types(&output.accepts, fluids, file)?,
        });
    }
    if let Some(tank) = &data.tank {
        spec = spec.with_tank(Tank::new(volume(tank.capacity, file, "tank capacity")?));
    }
    if let Some(layer) = data.layer {
        spec = spec.on_layer(PipeLayer(layer));
    }
    let (width, height) = (data.footprint.width, data.footprint.height);
    if !(1..=MAX_FOOTPRINT_SIDE).contains(&width) || !(1..=MAX_FOOTPRINT_SIDE).contains(&height) {
        return Err(DataLoadError::Invalid {
            file: file.to_path_buf(),
            detail: format!(
                "footprint of '{}' must be 1..={MAX_FOOTPRINT_SIDE} per side, got {width}x{height}",
                data.name
            ),
        });
    }
    spec = spec.with_status(NodeStatus {
        needs_power: data.status.needs_power,
        switchable: data.status.switchable,
        ..NodeStatus::default()
    });
    Ok(Template {
        spec,
        footprint: Footprint::new(width, height),
    })
}

/// Load `fluids.*` and `facilities.*` from `dir`, registering fluids in
/// `registry`.
pub fn load_catalog(dir: &Path, registry: &mut FluidRegistry) -> Result<Catalog, DataLoadError> {
    let fluids = load_fluids(dir, registry)?;

    let path = require_data_file(dir, "facilities")?;
    let facilities: Vec<FacilityData> = deserialize_list(&path, "facilities")?;
    let mut catalog = Catalog::new();
    for data in &facilities {
        let template = template_from_data(data, &fluids, &path)?;
        if !catalog.insert(&data.name, template) {
            return Err(DataLoadError::DuplicateName {
                file: path,
                name: data.name.clone(),
            });
        }
    }
    tracing::debug!(fluids = fluids.len(), templates = catalog.len(), "catalog loaded");
    Ok(catalog)
}

/// Load a whole map directory: config, catalog, and layout.
///
/// `network.*` and `layout.*` are optional. The returned manager has its
/// facilities registered but no networks until its first `advance`.
pub fn load_map(dir: &Path) -> Result<(Catalog, NetworkManager), DataLoadError> {
    let config: NetworkConfig = match find_data_file(dir, "network")? {
        Some(path) => deserialize_file(&path)?,
        None => NetworkConfig::default(),
    };
    let mut manager = NetworkManager::new(config);
    let catalog = load_catalog(dir, manager.fluids_mut())?;

    if let Some(path) = find_data_file(dir, "layout")? {
        let layout: LayoutData = deserialize_file(&path)?;
        apply_layout(&catalog, &mut manager, &layout, &path)?;
    }
    Ok((catalog, manager))
}

fn fluid_amount(
    manager: &NetworkManager,
    amount: &FluidAmount,
    file: &Path,
) -> Result<(FluidType, Volume), DataLoadError> {
    let fluid = manager
        .fluids()
        .lookup(&amount.fluid)
        .ok_or_else(|| DataLoadError::UnresolvedRef {
            file: file.to_path_buf(),
            name: amount.fluid.clone(),
            expected_kind: "fluid",
        })?;
    Ok((fluid, volume(amount.volume, file, "volume")?))
}

fn apply_layout(
    catalog: &Catalog,
    manager: &mut NetworkManager,
    layout: &LayoutData,
    file: &Path,
) -> Result<(), DataLoadError> {
    let mut labelled: HashMap<String, NodeId> = HashMap::new();

    for placement in &layout.placements {
        let template = catalog
            .get(&placement.template)
            .ok_or_else(|| DataLoadError::UnresolvedRef {
                file: file.to_path_buf(),
                name: placement.template.clone(),
                expected_kind: "facility",
            })?;
        let mut spec = template.instantiate(GridPosition::new(placement.x, placement.y));

        if let Some(contents) = &placement.contents {
            let (fluid, amount) = fluid_amount(manager, contents, file)?;
            let Some(tank) = spec.tank.as_mut() else {
                return Err(DataLoadError::Invalid {
                    file: file.to_path_buf(),
                    detail: format!("template '{}' has no tank for contents", placement.template),
                });
            };
            *tank = Tank::with_contents(tank.capacity(), amount, fluid);
        }
        let inflow = placement
            .inflow
            .as_ref()
            .map(|a| fluid_amount(manager, a, file))
            .transpose()?;

        if let Some(label) = &placement.id {
            check_duplicate(&labelled, label, file)?;
        }
        let node = manager.add_facility(spec);
        if let Some((fluid, amount)) = inflow {
            manager
                .set_inflow(node, amount, Some(fluid))
                .map_err(|e| DataLoadError::Invalid {
                    file: file.to_path_buf(),
                    detail: format!("placement of '{}': {e}", placement.template),
                })?;
        }
        if let Some(label) = &placement.id {
            labelled.insert(label.clone(), node);
        }
    }

    for link in &layout.links {
        let from = *resolve_name(&labelled, &link.from, file, "placement")?;
        let to = *resolve_name(&labelled, &link.to, file, "placement")?;
        manager.connect(from, to);
    }
    tracing::debug!(
        placements = layout.placements.len(),
        links = layout.links.len(),
        "layout applied"
    );
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
