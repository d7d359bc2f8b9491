use mlua::{Lua, Table};

use crate::generator::{ArgValue, GeneratorOptions};
use crate::timing::{Note, NoteSequence};

/// Name of the global function a generator script must define.
pub const GENERATE_FN: &str = "generate";

pub struct LuaRuntime {
    pub lua: Lua,
}

impl LuaRuntime {
    pub fn new() -> Result<Self, mlua::Error> {
        let lua = Lua::new();
        Ok(Self { lua })
    }

    pub fn execute(&self, code: &str) -> Result<(), mlua::Error> {
        self.lua.load(code).exec()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.lua.globals().get::<mlua::Function>(name).is_ok()
    }

    /// Calls `generate(primer, options)` and reads back the returned notes.
    ///
    /// The primer is `{ qpm, total_time, notes = { {pitch, velocity,
    /// start_time, end_time}, ... } }`. Options carry `generate_start`,
    /// `generate_end`, optional `input_start`/`input_end` and every arg by
    /// name. Returned notes may omit `velocity` (defaults to 100).
    pub fn execute_generate(
        &self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<Vec<Note>, mlua::Error> {
        let generate: mlua::Function = self.lua.globals().get(GENERATE_FN)?;
        let result: Table = generate.call((self.primer_table(primer)?, self.options_table(options)?))?;

        let mut notes = Vec::new();
        for pair in result.pairs::<usize, Table>() {
            let (_, note_table) = pair?;

            let pitch: u8 = note_table.get("pitch")?;
            let velocity: Option<u8> = note_table.get("velocity")?;
            let start_time: f64 = note_table.get("start_time")?;
            let end_time: f64 = note_table.get("end_time")?;

            notes.push(Note {
                pitch: pitch.min(127),
                velocity: velocity.unwrap_or(100).min(127),
                start_time,
                end_time,
            });
        }

        Ok(notes)
    }

    fn primer_table(&self, primer: &NoteSequence) -> Result<Table, mlua::Error> {
        let notes = self.lua.create_table()?;
        for (i, note) in primer.notes.iter().enumerate() {
            let entry = self.lua.create_table()?;
            entry.set("pitch", note.pitch)?;
            entry.set("velocity", note.velocity)?;
            entry.set("start_time", note.start_time)?;
            entry.set("end_time", note.end_time)?;
            notes.set(i + 1, entry)?;
        }

        let table = self.lua.create_table()?;
        table.set("qpm", primer.qpm)?;
        table.set("total_time", primer.total_time)?;
        table.set("notes", notes)?;
        Ok(table)
    }

    fn options_table(&self, options: &GeneratorOptions) -> Result<Table, mlua::Error> {
        let table = self.lua.create_table()?;
        for (name, value) in &options.args {
            match *value {
                ArgValue::Float(v) => table.set(name.as_str(), v)?,
                ArgValue::Int(v) => table.set(name.as_str(), v)?,
            }
        }
        let (start, end) = options.generate_time_range;
        table.set("generate_start", start)?;
        table.set("generate_end", end)?;
        if let Some((input_start, input_end)) = options.input_time_range {
            table.set("input_start", input_start)?;
            table.set("input_end", input_end)?;
        }
        Ok(table)
    }
}
