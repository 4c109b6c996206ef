//! Read-only declaration graph produced by the external compiler. The engine
//! never resolves names at dispatch time; every reference is a stable arena
//! index. The one deliberate exception is event-handler binding, which scans
//! member names when a withevents variable is assigned, exactly as the
//! legacy runtime did.

use std::collections::HashMap;

use crate::error::LinkError;
use crate::error::SourceLocation;
use crate::stmt::{Expr, Literal, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub usize);

/// Index into the engine's native-procedure registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub usize);

/// Declared type of a variable, parameter, or expression. A variant's
/// runtime kind may differ from its declared tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Empty,
    Null,
    Boolean,
    Integer,
    Long,
    Single,
    Double,
    Currency,
    Date,
    String,
    Object,
    Array,
    Error,
    Variant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    ByVal,
    ByRef,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub tag: TypeTag,
    pub mode: ParamMode,
    pub optional: bool,
    pub default: Option<Literal>,
    /// Trailing "array of remaining arguments" parameter.
    pub param_array: bool,
}

impl ParamDecl {
    pub fn by_val(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            tag,
            mode: ParamMode::ByVal,
            optional: false,
            default: None,
            param_array: false,
        }
    }

    pub fn by_ref(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            mode: ParamMode::ByRef,
            ..Self::by_val(name, tag)
        }
    }

    pub fn optional(name: impl Into<String>, tag: TypeTag, default: Option<Literal>) -> Self {
        Self {
            optional: true,
            default,
            ..Self::by_val(name, tag)
        }
    }

    pub fn param_array(name: impl Into<String>) -> Self {
        Self {
            param_array: true,
            ..Self::by_val(name, TypeTag::Array)
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub tag: TypeTag,
    /// Class of an object-typed variable.
    pub class: Option<ModuleId>,
    pub with_events: bool,
    /// Auto-instancing variable (`Dim x As New C`).
    pub with_new: bool,
}

impl VarDecl {
    pub fn scalar(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            tag,
            class: None,
            with_events: false,
            with_new: false,
        }
    }

    pub fn object(name: impl Into<String>, class: ModuleId) -> Self {
        Self {
            name: name.into(),
            tag: TypeTag::Object,
            class: Some(class),
            with_events: false,
            with_new: false,
        }
    }

    pub fn with_events(mut self) -> Self {
        self.with_events = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcKind {
    Sub,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
}

impl ProcKind {
    /// Function-likes own a result slot whose value becomes the return value.
    pub fn is_function_like(self) -> bool {
        matches!(self, ProcKind::Function | ProcKind::PropertyGet)
    }
}

/// One candidate of a rule group, selected at call time by guard matching.
#[derive(Debug, Clone)]
pub struct RuleCandidate {
    /// Accepts unconditionally when absent (and the arguments bind).
    pub guard: Option<Expr>,
    pub guard_loc: SourceLocation,
    pub body: ProcId,
}

/// The three callable shapes the stepper knows how to run. Native carries
/// only a registry index; its argument adaptation lives with the engine.
#[derive(Debug, Clone)]
pub enum ProcBody {
    Script(Vec<Statement>),
    Rules(Vec<RuleCandidate>),
    Native(NativeId),
}

#[derive(Debug, Clone)]
pub struct ProcDecl {
    pub name: String,
    pub module: ModuleId,
    pub kind: ProcKind,
    pub public: bool,
    pub params: Vec<ParamDecl>,
    /// Non-parameter locals; the frame's slot space is params then locals.
    pub locals: Vec<VarDecl>,
    /// Slot index of the function result local, for function-likes.
    pub result: Option<usize>,
    pub body: ProcBody,
}

impl ProcDecl {
    pub fn slot_count(&self) -> usize {
        self.params.len() + self.locals.len()
    }

    pub fn statements(&self) -> &[Statement] {
        match &self.body {
            ProcBody::Script(statements) => statements,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventDecl {
    pub name: String,
    pub owner: ModuleId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Standard,
    Class,
}

#[derive(Debug, Clone)]
pub struct ModuleDecl {
    pub name: String,
    pub kind: ModuleKind,
    pub fields: Vec<VarDecl>,
    /// Storage for statics declared inside this module's procedures; owned
    /// by the module instance so it survives frame pops.
    pub statics: Vec<VarDecl>,
    pub procs: Vec<ProcId>,
    pub events: Vec<EventId>,
    pub implements: Vec<ModuleId>,
    /// Field index of the hidden base-object variable of a class.
    pub base_field: Option<usize>,
    /// Interface member -> concrete overriding member, built at link time.
    pub impl_map: HashMap<(ModuleId, ProcId), ProcId>,
}

impl ModuleDecl {
    fn new(name: String, kind: ModuleKind) -> Self {
        Self {
            name,
            kind,
            fields: Vec::new(),
            statics: Vec::new(),
            procs: Vec::new(),
            events: Vec::new(),
            implements: Vec::new(),
            base_field: None,
            impl_map: HashMap::new(),
        }
    }
}

/// Arena holding every declaration by stable integer index.
#[derive(Debug, Clone, Default)]
pub struct DeclArena {
    pub modules: Vec<ModuleDecl>,
    pub procs: Vec<ProcDecl>,
    pub events: Vec<EventDecl>,
    base_class: Option<ModuleId>,
    base_initialize: Option<EventId>,
    base_terminate: Option<EventId>,
}

impl DeclArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, name: impl Into<String>, kind: ModuleKind) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleDecl::new(name.into(), kind));
        id
    }

    pub fn add_proc(&mut self, decl: ProcDecl) -> ProcId {
        let id = ProcId(self.procs.len());
        self.modules[decl.module.0].procs.push(id);
        self.procs.push(decl);
        id
    }

    pub fn add_event(&mut self, owner: ModuleId, name: impl Into<String>) -> EventId {
        let id = EventId(self.events.len());
        self.events.push(EventDecl {
            name: name.into(),
            owner,
        });
        self.modules[owner.0].events.push(id);
        id
    }

    pub fn add_field(&mut self, module: ModuleId, var: VarDecl) -> usize {
        let fields = &mut self.modules[module.0].fields;
        fields.push(var);
        fields.len() - 1
    }

    pub fn add_static(&mut self, module: ModuleId, var: VarDecl) -> usize {
        let statics = &mut self.modules[module.0].statics;
        statics.push(var);
        statics.len() - 1
    }

    pub fn module(&self, id: ModuleId) -> &ModuleDecl {
        &self.modules[id.0]
    }

    pub fn proc(&self, id: ProcId) -> &ProcDecl {
        &self.procs[id.0]
    }

    pub fn event(&self, id: EventId) -> &EventDecl {
        &self.events[id.0]
    }

    /// Case-insensitive member lookup, used at compile time and when binding
    /// event handlers on subscription.
    pub fn find_proc(&self, module: ModuleId, name: &str) -> Option<ProcId> {
        self.modules[module.0]
            .procs
            .iter()
            .copied()
            .find(|id| self.procs[id.0].name.eq_ignore_ascii_case(name))
    }

    /// The synthetic class behind every class instance's hidden base object,
    /// carrying the Initialize/Terminate event pair.
    pub fn ensure_base_class(&mut self) -> ModuleId {
        if let Some(id) = self.base_class {
            return id;
        }
        let id = self.add_module("Class", ModuleKind::Class);
        self.base_initialize = Some(self.add_event(id, "Initialize"));
        self.base_terminate = Some(self.add_event(id, "Terminate"));
        self.base_class = Some(id);
        id
    }

    pub fn base_class(&self) -> Option<ModuleId> {
        self.base_class
    }

    pub fn base_initialize(&self) -> Option<EventId> {
        self.base_initialize
    }

    pub fn base_terminate(&self) -> Option<EventId> {
        self.base_terminate
    }

    /// Gives a class module its hidden base-object member, wired withevents
    /// so `Class_Initialize` / `Class_Terminate` handlers bind to it.
    pub fn attach_base_object(&mut self, class: ModuleId) {
        let base = self.ensure_base_class();
        let mut var = VarDecl::object("Class", base).with_events();
        var.with_new = true;
        let index = self.add_field(class, var);
        self.modules[class.0].base_field = Some(index);
    }

    pub fn declare_implements(&mut self, class: ModuleId, interface: ModuleId) {
        self.modules[class.0].implements.push(interface);
    }

    /// Pairs every public member of each implemented class with the
    /// same-signature `<Interface>_<Member>` procedure on the implementor.
    /// Runs once at link time; failures are build-time conditions.
    pub fn link_implements(&mut self) -> Result<(), LinkError> {
        let mut updates: Vec<(ModuleId, HashMap<(ModuleId, ProcId), ProcId>)> = Vec::new();

        for (index, module) in self.modules.iter().enumerate() {
            if module.implements.is_empty() {
                continue;
            }
            let implementor = ModuleId(index);
            let mut map = HashMap::new();
            for &interface in &module.implements {
                for &member in &self.modules[interface.0].procs {
                    let decl = &self.procs[member.0];
                    if !decl.public {
                        continue;
                    }
                    let mirror = format!("{}_{}", self.modules[interface.0].name, decl.name);
                    let overrider = self.find_proc(implementor, &mirror).ok_or_else(|| {
                        LinkError::MissingMember {
                            implementor: module.name.clone(),
                            interface: self.modules[interface.0].name.clone(),
                            member: decl.name.clone(),
                        }
                    })?;
                    if !params_match(&decl.params, &self.procs[overrider.0].params) {
                        return Err(LinkError::SignatureMismatch {
                            implementor: module.name.clone(),
                            interface: self.modules[interface.0].name.clone(),
                            member: decl.name.clone(),
                        });
                    }
                    map.insert((interface, member), overrider);
                }
            }
            updates.push((implementor, map));
        }

        for (implementor, map) in updates {
            self.modules[implementor.0].impl_map = map;
        }
        Ok(())
    }

    /// Resolves a call arriving through an implemented-interface view to the
    /// concrete overriding member.
    pub fn forward_interface(
        &self,
        class: ModuleId,
        interface: ModuleId,
        member: ProcId,
    ) -> Option<ProcId> {
        self.modules[class.0].impl_map.get(&(interface, member)).copied()
    }
}

fn params_match(a: &[ParamDecl], b: &[ParamDecl]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.mode == y.mode
                && x.optional == y.optional
                && x.param_array == y.param_array
                && x.tag == y.tag
        })
}
