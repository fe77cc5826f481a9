//! Declarative package format.
//!
//! A [`Package`] is the on-disk description of a whole study: horizon,
//! buses, sources, sinks, converters, named series and emission
//! limits. Converter records use flat column-style fields
//! (`from_bus_0`, `conversion_factor_gas`, ...) so that spreadsheet
//! exports map onto them directly; [`crate::resolve`] turns them into
//! typed nodes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mimo_core::{
    Bus, EnergySystem, Gas, Horizon, Period, Sequence, SequenceStore, Sink, Source,
};
use mimo_model::EmissionLimit;
use serde::{Deserialize, Serialize};

use crate::resolve;

/// A scalar or a reference to a named series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Name(String),
}

impl FieldValue {
    pub fn to_sequence(&self) -> Sequence {
        match self {
            FieldValue::Number(v) => Sequence::constant(*v),
            FieldValue::Name(name) => Sequence::named(name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonRecord {
    pub year: u32,
    pub timesteps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusRecord {
    pub name: String,
    /// Defaults to the bus name when omitted.
    #[serde(default)]
    pub commodity: Option<String>,
    #[serde(default = "default_true")]
    pub balanced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub name: String,
    pub bus: String,
    #[serde(default = "default_nominal")]
    pub nominal: f64,
    #[serde(default)]
    pub fix: Option<FieldValue>,
    #[serde(default)]
    pub max: Option<FieldValue>,
    #[serde(default)]
    pub variable_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkRecord {
    pub name: String,
    pub bus: String,
    #[serde(default = "default_nominal")]
    pub nominal: f64,
    #[serde(default)]
    pub fix: Option<FieldValue>,
}

/// A converter in flat column form. Everything that is not a named
/// field lands in `fields` and is interpreted by naming convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub primary: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub expandable: bool,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub capacity_cost: Option<f64>,
    #[serde(default)]
    pub capacity_potential: Option<f64>,
    #[serde(default)]
    pub capacity_minimum: Option<f64>,
    #[serde(default)]
    pub activity_bound_max: Option<FieldValue>,
    #[serde(default)]
    pub activity_bound_min: Option<FieldValue>,
    #[serde(default)]
    pub activity_bound_fix: Option<FieldValue>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub name: String,
    pub year: u32,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionLimitRecord {
    pub name: String,
    pub year: u32,
    #[serde(default)]
    pub co2_limit: Option<f64>,
    #[serde(default = "default_ch4_factor")]
    pub ch4_factor: f64,
    #[serde(default = "default_n2o_factor")]
    pub n2o_factor: f64,
    #[serde(default)]
    pub co2_commodities: Vec<String>,
    #[serde(default)]
    pub ch4_commodities: Vec<String>,
    #[serde(default)]
    pub n2o_commodities: Vec<String>,
    #[serde(default)]
    pub negative_co2_commodities: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_nominal() -> f64 {
    1.0
}

fn default_ch4_factor() -> f64 {
    Gas::Ch4.default_gwp()
}

fn default_n2o_factor() -> f64 {
    Gas::N2o.default_gwp()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub horizon: Vec<HorizonRecord>,
    #[serde(default)]
    pub buses: Vec<BusRecord>,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
    #[serde(default)]
    pub sinks: Vec<SinkRecord>,
    #[serde(default)]
    pub converters: Vec<NodeRecord>,
    #[serde(default)]
    pub series: Vec<SeriesRecord>,
    #[serde(default)]
    pub emission_limits: Vec<EmissionLimitRecord>,
}

/// Everything a package resolves to, ready for model construction.
pub struct ResolvedPackage {
    pub system: EnergySystem,
    pub horizon: Horizon,
    pub store: SequenceStore,
    pub limits: Vec<EmissionLimit>,
}

impl Package {
    /// Load a package from a YAML or JSON file, chosen by extension.
    pub fn from_path(path: &Path) -> Result<Package> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading package '{}'", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&data).context("parsing package yaml")
            }
            Some("json") => serde_json::from_str(&data).context("parsing package json"),
            _ => serde_yaml::from_str(&data)
                .or_else(|_| serde_json::from_str(&data))
                .context("parsing package as yaml or json"),
        }
    }

    /// Resolve the package into a typed system, horizon and series
    /// store.
    pub fn build(&self) -> Result<ResolvedPackage> {
        let horizon = Horizon::multi(
            self.horizon
                .iter()
                .map(|h| (h.year, h.timesteps))
                .collect(),
        )
        .context("building horizon")?;

        let mut system = EnergySystem::new();
        for record in &self.buses {
            let commodity = record.commodity.clone().unwrap_or_else(|| record.name.clone());
            let mut bus = Bus::new(&record.name, commodity);
            if !record.balanced {
                bus = bus.unbalanced();
            }
            system
                .add_bus(bus)
                .with_context(|| format!("adding bus '{}'", record.name))?;
        }
        for record in &self.sources {
            let mut source = Source::new(&record.name, &record.bus)
                .with_nominal(record.nominal)
                .with_variable_cost(record.variable_cost);
            if let Some(fix) = &record.fix {
                source = source.with_fix(fix.to_sequence());
            }
            if let Some(max) = &record.max {
                source = source.with_max(max.to_sequence());
            }
            system
                .add_source(source)
                .with_context(|| format!("adding source '{}'", record.name))?;
        }
        for record in &self.sinks {
            let mut sink = Sink::new(&record.name, &record.bus).with_nominal(record.nominal);
            if let Some(fix) = &record.fix {
                sink = sink.with_fix(fix.to_sequence());
            }
            system
                .add_sink(sink)
                .with_context(|| format!("adding sink '{}'", record.name))?;
        }
        for record in &self.converters {
            let node = resolve::resolve_node(record)
                .with_context(|| format!("resolving converter '{}'", record.name))?;
            system
                .add_converter(node)
                .with_context(|| format!("adding converter '{}'", record.name))?;
        }

        let mut store = SequenceStore::new();
        for record in &self.series {
            store.insert(&record.name, Period::new(record.year), record.values.clone());
        }

        let limits = self
            .emission_limits
            .iter()
            .map(|record| EmissionLimit {
                name: record.name.clone(),
                period: Period::new(record.year),
                co2_limit: record.co2_limit,
                ch4_factor: record.ch4_factor,
                n2o_factor: record.n2o_factor,
                co2_commodities: record.co2_commodities.clone(),
                ch4_commodities: record.ch4_commodities.clone(),
                n2o_commodities: record.n2o_commodities.clone(),
                negative_co2_commodities: record.negative_co2_commodities.clone(),
            })
            .collect();

        Ok(ResolvedPackage {
            system,
            horizon,
            store,
            limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PACKAGE: &str = r#"
horizon:
  - { year: 2030, timesteps: 2 }
buses:
  - { name: gas }
  - { name: electricity }
  - { name: co2, balanced: false }
sources:
  - { name: import, bus: gas, variable_cost: 2.0 }
sinks:
  - { name: demand, bus: electricity, fix: load }
series:
  - { name: load, year: 2030, values: [30.0, 50.0] }
converters:
  - name: plant
    primary: electricity
    from_bus_0: gas
    to_bus_0: electricity
    conversion_factor_gas: 0.8
    emission_factor_gas_co2: 0.2
emission_limits:
  - name: climate
    year: 2030
    co2_limit: 100.0
    co2_commodities: [co2]
"#;

    #[test]
    fn yaml_package_round_trips_into_a_system() {
        let package: Package = serde_yaml::from_str(PACKAGE).unwrap();
        let resolved = package.build().unwrap();
        assert_eq!(resolved.horizon.len(), 2);
        assert!(resolved.system.bus("gas").is_some());
        assert_eq!(resolved.limits.len(), 1);
        assert_eq!(resolved.limits[0].co2_limit, Some(100.0));
        assert!((resolved.limits[0].ch4_factor - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn file_loader_honours_the_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(PACKAGE.as_bytes()).unwrap();
        let package = Package::from_path(file.path()).unwrap();
        assert_eq!(package.converters.len(), 1);
    }

    const PACKAGE_JSON: &str = r#"{
  "horizon": [{ "year": 2030, "timesteps": 2 }],
  "buses": [{ "name": "gas" }, { "name": "electricity" }],
  "converters": [
    {
      "name": "plant",
      "primary": "electricity",
      "from_bus_0": "gas",
      "to_bus_0": "electricity",
      "conversion_factor_gas": 0.8
    }
  ]
}"#;

    #[test]
    fn json_file_parses_through_the_json_branch() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        file.write_all(PACKAGE_JSON.as_bytes()).unwrap();
        let package = Package::from_path(file.path()).unwrap();
        assert_eq!(package.buses.len(), 2);
        let resolved = package.build().unwrap();
        assert!(resolved.system.bus("electricity").is_some());
    }

    #[test]
    fn unknown_extension_falls_back_to_either_format() {
        let mut yaml = tempfile::Builder::new().suffix(".pkg").tempfile().unwrap();
        yaml.write_all(PACKAGE.as_bytes()).unwrap();
        assert_eq!(Package::from_path(yaml.path()).unwrap().converters.len(), 1);

        let mut json = tempfile::Builder::new().suffix(".pkg").tempfile().unwrap();
        json.write_all(PACKAGE_JSON.as_bytes()).unwrap();
        assert_eq!(Package::from_path(json.path()).unwrap().buses.len(), 2);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = Package::from_path(Path::new("/nonexistent/package.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/package.yaml"));
    }

    #[test]
    fn commodity_defaults_to_the_bus_name() {
        let package: Package = serde_yaml::from_str(PACKAGE).unwrap();
        let resolved = package.build().unwrap();
        assert_eq!(resolved.system.bus("gas").unwrap().commodity, "gas");
    }
}
