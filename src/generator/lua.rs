use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use super::{ArgValue, GeneratorBundle, GeneratorOptions, SequenceGenerator, check_extends_primer};
use crate::error::{BundleError, GenerationError};
use crate::scripting::LuaRuntime;
use crate::scripting::lua_runtime::GENERATE_FN;
use crate::timing::NoteSequence;

/// A generator whose model is a Lua script defining
/// `generate(primer, options)`.
pub struct LuaGenerator {
    id: String,
    defaults: BTreeMap<String, ArgValue>,
    runtime: Mutex<LuaRuntime>,
}

impl LuaGenerator {
    pub fn from_source(id: &str, source: &str) -> Result<Self, BundleError> {
        let init_err = |e: mlua::Error| BundleError::Init(id.to_string(), e.to_string());
        let runtime = LuaRuntime::new().map_err(init_err)?;
        runtime.execute(source).map_err(init_err)?;
        if !runtime.has_function(GENERATE_FN) {
            return Err(BundleError::Init(
                id.to_string(),
                format!("script does not define `{GENERATE_FN}`"),
            ));
        }
        Ok(Self {
            id: id.to_string(),
            defaults: BTreeMap::new(),
            runtime: Mutex::new(runtime),
        })
    }

    pub fn from_bundle(bundle: &GeneratorBundle) -> Result<Self, BundleError> {
        let source = bundle
            .script
            .as_deref()
            .ok_or_else(|| BundleError::MissingScript(bundle.id.clone()))?;
        let mut generator = Self::from_source(&bundle.id, source)?;
        generator.defaults = bundle.args.clone();
        Ok(generator)
    }
}

impl SequenceGenerator for LuaGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn generate(
        &self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<NoteSequence, GenerationError> {
        check_extends_primer(primer, options)?;

        let mut merged = options.clone();
        for (name, value) in &self.defaults {
            merged.args.entry(name.clone()).or_insert(*value);
        }

        let notes = self
            .runtime
            .lock()
            .execute_generate(primer, &merged)
            .map_err(|e| GenerationError::Script(e.to_string()))?;

        let notes = notes
            .into_iter()
            .filter(|n| n.end_time > n.start_time)
            .collect::<Vec<_>>();
        debug!(generator = %self.id, notes = notes.len(), "script generated notes");

        let mut response = NoteSequence::from_notes(primer.qpm, notes);
        response.total_time = response.total_time.max(options.generate_time_range.1);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Note;

    const ARPEGGIO: &str = r#"
        function generate(primer, options)
            local notes = {}
            local root = 60
            if #primer.notes > 0 then
                root = primer.notes[#primer.notes].pitch
            end
            local step = 60 / primer.qpm / 2
            local t = options.generate_start
            local i = 0
            while t + step <= options.generate_end do
                local offset = ({0, 4, 7})[i % 3 + 1]
                notes[#notes + 1] = {
                    pitch = root + offset + (options.transpose or 0),
                    start_time = t,
                    end_time = t + step,
                }
                t = t + step
                i = i + 1
            end
            return notes
        end
    "#;

    fn primer() -> NoteSequence {
        let mut primer = NoteSequence::from_notes(120.0, vec![Note::new(62, 90, 0.0, 0.5)]);
        primer.total_time = 2.0;
        primer
    }

    #[test]
    fn test_script_generates_notes() {
        let generator = LuaGenerator::from_source("arp", ARPEGGIO).unwrap();
        let options = GeneratorOptions::new((2.0, 3.0)).with_arg("temperature", ArgValue::Float(1.0));
        let response = generator.generate(&primer(), &options).unwrap();
        let pitches: Vec<u8> = response.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![62, 66, 69, 62]);
        assert_eq!(response.notes[0].velocity, 100);
        assert_eq!(response.total_time, 3.0);
    }

    #[test]
    fn test_bundle_args_are_defaults() {
        let bundle = GeneratorBundle {
            id: "lua".to_string(),
            name: None,
            args: BTreeMap::from([("transpose".to_string(), ArgValue::Int(12))]),
            script: Some(ARPEGGIO.to_string()),
            script_file: None,
        };
        let generator = LuaGenerator::from_bundle(&bundle).unwrap();
        let response = generator
            .generate(&primer(), &GeneratorOptions::new((2.0, 2.25)))
            .unwrap();
        assert_eq!(response.notes[0].pitch, 74);
    }

    #[test]
    fn test_script_errors_surface_as_generation_errors() {
        let generator =
            LuaGenerator::from_source("broken", "function generate(p, o) error('boom') end").unwrap();
        let err = generator
            .generate(&primer(), &GeneratorOptions::new((2.0, 4.0)))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Script(message) if message.contains("boom")));
    }

    #[test]
    fn test_script_must_define_generate() {
        assert!(matches!(
            LuaGenerator::from_source("empty", "x = 1"),
            Err(BundleError::Init(..))
        ));
    }
}
