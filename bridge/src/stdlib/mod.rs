//! Modules bundled with the runtime. Preloaded, loaded on first `require`.

pub mod buffer;
pub mod ext;

use crate::loader::{ModuleEntry, ModuleLoader};

pub fn open_all(loader: &mut ModuleLoader) {
    for def in [&ext::MODULE, &buffer::MODULE] {
        loader.insert(def.entry_symbol(), ModuleEntry::Def(def));
    }
}
