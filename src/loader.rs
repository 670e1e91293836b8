//! Transformation Definition Loading
//!
//! Reads transformation descriptions from their XML definition format:
//!
//! ```xml
//! <transformations>
//!   <transformation source="Issue" target="Ticket" id="issue-to-ticket">
//!     <concat>
//!       <source-fields>
//!         <source-field>project</source-field>
//!         <source-field>number</source-field>
//!       </source-fields>
//!       <target-field>key</target-field>
//!       <operation-string>-</operation-string>
//!     </concat>
//!     <pad>
//!       <source-fields><source-field>number</source-field></source-fields>
//!       <target-field>padded</target-field>
//!       <params>
//!         <param key="length" value="5"/>
//!         <param key="character" value="0"/>
//!       </params>
//!     </pad>
//!   </transformation>
//! </transformations>
//! ```
//!
//! Source and target type names are resolved through the type resolver, so
//! a definition naming an unknown type fails to load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{BridgeError, Result};
use crate::transformation::{TransformationDescription, TransformationOperation, TransformationStep};
use crate::types::TypeResolver;

/// Configuration for directory loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Extension of definition files, without the dot
    pub extension: String,
    /// Skip files whose path relative to the root starts with one of these
    pub skip_prefixes: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            extension: "transformation".to_string(),
            skip_prefixes: vec!["target/".to_string(), ".git/".to_string()],
        }
    }
}

/// Descriptions of one definition file
#[derive(Debug, Clone)]
pub struct DefinitionFile {
    pub path: PathBuf,
    /// Name recorded on every description of the file
    pub file_name: String,
    pub descriptions: Vec<TransformationDescription>,
}

/// All definition files found under a directory
#[derive(Debug, Clone)]
pub struct DefinitionBundle {
    pub files: Vec<DefinitionFile>,
    /// SHA-256 over the file contents in path order
    pub bundle_hash: String,
}

impl DefinitionBundle {
    pub fn description_count(&self) -> usize {
        self.files.iter().map(|f| f.descriptions.len()).sum()
    }
}

/// Parse every description in a definition document
pub fn load_descriptions(text: &str, resolver: &dyn TypeResolver) -> Result<Vec<TransformationDescription>> {
    let mut reader = Reader::from_str(text);
    let mut state = ReaderState::new(resolver);

    loop {
        match reader.read_event()? {
            Event::Start(e) => state.start(&e)?,
            Event::Empty(e) => {
                state.start(&e)?;
                state.end(&element_name(&e))?;
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                state.end(&name)?;
            }
            Event::Text(t) => state.text(&t.unescape()?),
            Event::CData(c) => state.text(&String::from_utf8_lossy(&c.into_inner())),
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

/// Parse a definition file; every description records the file name
pub fn load_from_file(path: &Path, resolver: &dyn TypeResolver) -> Result<Vec<TransformationDescription>> {
    let content = fs::read_to_string(path)?;
    let file_name = path.display().to_string();
    let descriptions = load_descriptions(&content, resolver).map_err(|e| {
        warn!(path = %path.display(), error = %e, "failed to load definition file");
        e
    })?;
    debug!(path = %path.display(), count = descriptions.len(), "loaded definition file");
    Ok(descriptions
        .into_iter()
        .map(|d| d.with_file_name(file_name.clone()))
        .collect())
}

/// Load every definition file below a directory
pub fn load_from_directory(
    dir: &Path,
    config: &LoadConfig,
    resolver: &dyn TypeResolver,
) -> Result<DefinitionBundle> {
    let mut hasher = Sha256::new();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().map(|e| e != config.extension.as_str()).unwrap_or(true) {
            continue;
        }
        let relative = path.strip_prefix(dir).unwrap_or(path).to_string_lossy().replace('\\', "/");
        if config.skip_prefixes.iter().any(|p| relative.starts_with(p)) {
            continue;
        }

        let content = fs::read(path)?;
        hasher.update(&content);

        let descriptions = load_from_file(path, resolver)?;
        files.push(DefinitionFile {
            path: path.to_path_buf(),
            file_name: path.display().to_string(),
            descriptions,
        });
    }

    let bundle = DefinitionBundle {
        files,
        bundle_hash: format!("{:x}", hasher.finalize()),
    };
    info!(
        dir = %dir.display(),
        files = bundle.files.len(),
        descriptions = bundle.description_count(),
        hash = %bundle.bundle_hash,
        "loaded transformation definitions"
    );
    Ok(bundle)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn invalid(message: impl Into<String>) -> BridgeError {
    BridgeError::InvalidDefinition(message.into())
}

/// Element whose text content is being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    SourceField,
    TargetField,
    OperationString,
}

struct ReaderState<'r> {
    resolver: &'r dyn TypeResolver,
    descriptions: Vec<TransformationDescription>,
    active: Option<TransformationDescription>,
    operation: Option<(String, TransformationOperation)>,
    source_fields: Vec<String>,
    target_field: Option<String>,
    operation_string: Option<String>,
    params: BTreeMap<String, String>,
    capture: Option<Capture>,
    buffer: String,
}

impl<'r> ReaderState<'r> {
    fn new(resolver: &'r dyn TypeResolver) -> Self {
        Self {
            resolver,
            descriptions: Vec::new(),
            active: None,
            operation: None,
            source_fields: Vec::new(),
            target_field: None,
            operation_string: None,
            params: BTreeMap::new(),
            capture: None,
            buffer: String::new(),
        }
    }

    fn start(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let name = element_name(e);
        match name.as_str() {
            "transformations" | "source-fields" | "params" => {}
            "transformation" => {
                if self.active.is_some() {
                    return Err(invalid("nested <transformation> element"));
                }
                let attrs = attributes(e)?;
                let source = attrs
                    .get("source")
                    .ok_or_else(|| invalid("<transformation> without source attribute"))?;
                let target = attrs
                    .get("target")
                    .ok_or_else(|| invalid("<transformation> without target attribute"))?;
                let source = self.resolver.resolve(source)?;
                let target = self.resolver.resolve(target)?;
                let mut description = TransformationDescription::new(&source.type_id, &target.type_id);
                description.id = attrs.get("id").cloned();
                self.active = Some(description);
            }
            "source-field" => self.begin_capture(Capture::SourceField)?,
            "target-field" => self.begin_capture(Capture::TargetField)?,
            "operation-string" => self.begin_capture(Capture::OperationString)?,
            "param" => {
                let attrs = attributes(e)?;
                let key = attrs
                    .get("key")
                    .ok_or_else(|| invalid("<param> without key attribute"))?;
                let value = attrs.get("value").cloned().unwrap_or_default();
                self.params.insert(key.clone(), value);
            }
            other => {
                if self.active.is_none() {
                    return Err(invalid(format!("<{}> outside of a <transformation>", other)));
                }
                if let Some((open, _)) = &self.operation {
                    return Err(invalid(format!("<{}> nested in <{}>", other, open)));
                }
                let operation: TransformationOperation = other.parse()?;
                self.operation = Some((other.to_string(), operation));
            }
        }
        Ok(())
    }

    fn begin_capture(&mut self, capture: Capture) -> Result<()> {
        if self.operation.is_none() {
            return Err(invalid(format!("{:?} element outside of an operation", capture)));
        }
        self.capture = Some(capture);
        self.buffer.clear();
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if self.capture.is_some() {
            self.buffer.push_str(text);
        }
    }

    fn end(&mut self, name: &str) -> Result<()> {
        match name {
            "transformations" | "source-fields" | "params" | "param" => {}
            "source-field" | "target-field" | "operation-string" => {
                let captured = std::mem::take(&mut self.buffer);
                match self.capture.take() {
                    Some(Capture::SourceField) => self.source_fields.push(captured.trim().to_string()),
                    Some(Capture::TargetField) => self.target_field = Some(captured.trim().to_string()),
                    // Separators such as a single space must survive
                    Some(Capture::OperationString) => self.operation_string = Some(captured),
                    None => {}
                }
            }
            "transformation" => {
                let description = self
                    .active
                    .take()
                    .ok_or_else(|| invalid("unbalanced </transformation>"))?;
                debug!(transformation = %description, steps = description.steps.len(), "read transformation");
                self.descriptions.push(description);
            }
            _ => self.finish_operation()?,
        }
        Ok(())
    }

    /// Turn the collected buffers into a step and clear them
    fn finish_operation(&mut self) -> Result<()> {
        let Some((name, operation)) = self.operation.take() else {
            return Ok(());
        };
        let source_fields = std::mem::take(&mut self.source_fields);
        let target_field = self.target_field.take();
        let operation_string = self.operation_string.take();
        let mut params = std::mem::take(&mut self.params);

        if operation.needs_source() && source_fields.is_empty() {
            return Err(invalid(format!("<{}> has no source-field", name)));
        }
        let Some(target_field) = target_field.filter(|t| !t.is_empty()) else {
            return Err(invalid(format!("<{}> has no target-field", name)));
        };
        if let Some(value) = operation_string {
            match operation.primary_param() {
                Some(key) => {
                    params.insert(key.to_string(), value);
                }
                None => warn!(operation = %operation, "operation-string ignored for this operation"),
            }
        }

        let description = self
            .active
            .as_mut()
            .ok_or_else(|| invalid(format!("<{}> outside of a <transformation>", name)))?;
        description.add_step(TransformationStep {
            operation,
            source_fields,
            target_field: Some(target_field),
            params,
        });
        Ok(())
    }

    fn finish(self) -> Result<Vec<TransformationDescription>> {
        if let Some(open) = self.active {
            return Err(invalid(format!("unclosed <transformation> {}", open)));
        }
        Ok(self.descriptions)
    }
}

fn attributes(e: &BytesStart<'_>) -> Result<BTreeMap<String, String>> {
    let mut attrs = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}
