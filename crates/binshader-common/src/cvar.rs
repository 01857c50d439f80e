// cvar.rs — console variables
//
// Every tunable of the tools is a named cvar holding both a string and a
// float view of its value. Command line `+set name value` pairs create cvars
// before the owning module registers them, so a registration never overrides
// what the user asked for.

use std::collections::HashMap;

use crate::common::{com_printf, ComArgs};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// Shown with a `*` in cvarlist; the value is meant to persist.
        const ARCHIVE = 0x01;
        /// Can only be changed from the command line or by force_set.
        const NOSET   = 0x02;
    }
}

/// A console variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: CvarFlags,
    pub value: f32,
}

/// The cvar registry.
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self {
            cvar_vars: Vec::new(),
            cvar_index: HashMap::new(),
        }
    }

    /// Find a cvar by name, returning its index.
    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        match self.find_var(name) {
            Some(var) => var.value,
            None => 0.0,
        }
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        match self.find_var(name) {
            Some(var) => &var.string,
            None => "",
        }
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            value: value.parse::<f32>().unwrap_or(0.0),
        });
        self.cvar_index.insert(name.to_string(), idx);

        idx
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, CvarFlags::empty()),
        };

        let var = &mut self.cvar_vars[idx];
        if !force && var.flags.contains(CvarFlags::NOSET) {
            com_printf(&format!("{} is write protected.\n", name));
            return idx;
        }

        if value == var.string {
            return idx; // not changed
        }

        var.string = value.to_string();
        var.value = value.parse::<f32>().unwrap_or(0.0);

        idx
    }

    /// Set a cvar value (respects NOSET).
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET).
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, true)
    }

    /// Applies `+set <name> <value>` triples from the command line.
    /// The consumed argv entries are cleared so later parsing skips them.
    pub fn add_early_commands(&mut self, args: &mut ComArgs) {
        let argc = args.com_argc();
        let mut i = 0;
        while i < argc {
            if args.com_argv(i) != "+set" {
                i += 1;
                continue;
            }
            let name = args.com_argv(i + 1).to_string();
            let value = args.com_argv(i + 2).to_string();
            if name.is_empty() {
                com_printf("usage: +set <variable> <value>\n");
            } else {
                // command line wins over NOSET
                self.force_set(&name, &value);
            }
            args.com_clear_argv(i);
            args.com_clear_argv(i + 1);
            args.com_clear_argv(i + 2);
            i += 3;
        }
    }

    /// List cvars whose name starts with `prefix` (all when `None`).
    pub fn list(&self, prefix: Option<&str>) -> (usize, usize) {
        let prefix = prefix.unwrap_or("");
        let mut matching = 0;

        for var in &self.cvar_vars {
            if !var.name.starts_with(prefix) {
                continue;
            }
            matching += 1;
            let archive = if var.flags.contains(CvarFlags::ARCHIVE) { '*' } else { ' ' };
            let noset = if var.flags.contains(CvarFlags::NOSET) { '-' } else { ' ' };
            com_printf(&format!("{}{} {} \"{}\"\n", archive, noset, var.name, var.string));
        }

        let total = self.cvar_vars.len();
        com_printf(&format!("{} cvars, {} matching\n", total, matching));
        (total, matching)
    }
}

impl Default for CvarContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Tests
// ============================================================
