//! The export surface the host drives.

use std::collections::HashMap;
use std::fmt;

use wasmtime::{Func, Instance, Memory, Store, Val, ValType};

use super::error::WasmError;
use super::imports::{GuestExit, HostState, UnavailableImport};
use crate::logging::{debug, error};

/// Startup entrypoint, called exactly once before the exports are captured.
pub const START_EXPORT: &str = "_start";

/// Linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Function exports the facade calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportName {
    AngleFromDeg,
    FindLongitude,
    CalendarGregorianToJd,
    FindAscendingNode,
    FindMoonPhase,
    FindStellarLongitude,
    GetSunRiseSetPtr,
    FindSunRiseSet,
    GetObliquityLstContainer,
    FindObliquityLst,
    GetHouseContainer,
    FindHouses,
    GetTimeContainer,
    JdToCalendar,
    /// Pending-error flag. Older builds do not export it.
    AnyErrors,
}

impl ExportName {
    /// Exports that must be present for the module to load.
    pub const REQUIRED: [ExportName; 14] = [
        ExportName::AngleFromDeg,
        ExportName::FindLongitude,
        ExportName::CalendarGregorianToJd,
        ExportName::FindAscendingNode,
        ExportName::FindMoonPhase,
        ExportName::FindStellarLongitude,
        ExportName::GetSunRiseSetPtr,
        ExportName::FindSunRiseSet,
        ExportName::GetObliquityLstContainer,
        ExportName::FindObliquityLst,
        ExportName::GetHouseContainer,
        ExportName::FindHouses,
        ExportName::GetTimeContainer,
        ExportName::JdToCalendar,
    ];

    /// Exports captured only when the module provides them.
    pub const OPTIONAL: [ExportName; 1] = [ExportName::AnyErrors];

    /// Symbol the module exports the function under.
    pub const fn symbol(self) -> &'static str {
        match self {
            ExportName::AngleFromDeg => "angleFromDeg",
            ExportName::FindLongitude => "findLongitude",
            ExportName::CalendarGregorianToJd => "calendarGregorianToJD",
            ExportName::FindAscendingNode => "findAscendingNode",
            ExportName::FindMoonPhase => "findMoonPhase",
            ExportName::FindStellarLongitude => "findStellarLongitude",
            ExportName::GetSunRiseSetPtr => "getSunRiseSetPtr",
            ExportName::FindSunRiseSet => "findSunRiseSet",
            ExportName::GetObliquityLstContainer => "getObliquityLSTContainer",
            ExportName::FindObliquityLst => "findObliquityLST",
            ExportName::GetHouseContainer => "getHouseContainer",
            ExportName::FindHouses => "findHouses",
            ExportName::GetTimeContainer => "getTimeContainer",
            ExportName::JdToCalendar => "jdToCalendar",
            ExportName::AnyErrors => "anyErrors",
        }
    }

    /// Number of parameters the export takes.
    pub const fn arity(self) -> usize {
        match self {
            ExportName::GetSunRiseSetPtr
            | ExportName::GetObliquityLstContainer
            | ExportName::GetHouseContainer
            | ExportName::GetTimeContainer
            | ExportName::AnyErrors => 0,
            ExportName::AngleFromDeg
            | ExportName::FindAscendingNode
            | ExportName::FindMoonPhase
            | ExportName::JdToCalendar => 1,
            ExportName::FindObliquityLst => 2,
            ExportName::CalendarGregorianToJd
            | ExportName::FindSunRiseSet
            | ExportName::FindHouses => 3,
            ExportName::FindLongitude => 7,
            ExportName::FindStellarLongitude => 10,
        }
    }

    /// Whether the export returns a scalar. The populate exports return nothing
    /// and stage their results in a scratch region instead.
    pub const fn returns_value(self) -> bool {
        !matches!(
            self,
            ExportName::FindSunRiseSet
                | ExportName::FindObliquityLst
                | ExportName::FindHouses
                | ExportName::JdToCalendar
        )
    }
}

impl fmt::Display for ExportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An export called with `f64` arguments.
///
/// Arguments are coerced to the declared parameter types at call time, so
/// integer parameters (year, month, body index) take the truncated value.
#[derive(Debug, Clone)]
pub struct ScalarFunc {
    name: ExportName,
    func: Func,
    params: Vec<ValType>,
    results: Vec<ValType>,
}

impl ScalarFunc {
    fn capture(
        name: ExportName,
        instance: &Instance,
        store: &mut Store<HostState>,
    ) -> Result<Option<Self>, WasmError> {
        let Some(func) = instance.get_func(&mut *store, name.symbol()) else {
            return Ok(None);
        };
        let ty = func.ty(&*store);
        let params: Vec<ValType> = ty.params().collect();
        let results: Vec<ValType> = ty.results().collect();

        let expected_results = usize::from(name.returns_value());
        let results_ok = if name.returns_value() {
            results.len() == expected_results
        } else {
            results.len() <= 1
        };
        if params.len() != name.arity() || !results_ok {
            error!(export = name.symbol(), "export signature mismatch");
            return Err(WasmError::ExportSignature {
                name: name.symbol().to_string(),
                expected: format!("{} params, {} results", name.arity(), expected_results),
                actual: format!("{} params, {} results", params.len(), results.len()),
            });
        }

        Ok(Some(Self {
            name,
            func,
            params,
            results,
        }))
    }

    /// Call the export and return its raw result, if it has one.
    pub(crate) fn invoke(
        &self,
        store: &mut Store<HostState>,
        args: &[f64],
    ) -> Result<Option<Val>, WasmError> {
        if args.len() != self.params.len() {
            return Err(WasmError::ExportSignature {
                name: self.name.symbol().to_string(),
                expected: format!("{} params", self.params.len()),
                actual: format!("{} arguments", args.len()),
            });
        }

        let params = args
            .iter()
            .zip(&self.params)
            .map(|(arg, ty)| coerce(*arg, ty).ok_or_else(|| self.unsupported(ty)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut results = self
            .results
            .iter()
            .map(|ty| coerce(0.0, ty).ok_or_else(|| self.unsupported(ty)))
            .collect::<Result<Vec<_>, _>>()?;

        self.func
            .call(&mut *store, &params, &mut results)
            .map_err(|e| {
                error!(export = self.name.symbol(), error = %e, "export trapped");
                trap_error(e)
            })?;

        Ok(results.into_iter().next())
    }

    /// Call an export that produces one scalar.
    pub(crate) fn call(&self, store: &mut Store<HostState>, args: &[f64]) -> Result<f64, WasmError> {
        match self.invoke(store, args)? {
            Some(Val::F64(bits)) => Ok(f64::from_bits(bits)),
            Some(Val::F32(bits)) => Ok(f64::from(f32::from_bits(bits))),
            Some(Val::I32(v)) => Ok(f64::from(v)),
            Some(Val::I64(v)) => Ok(v as f64),
            other => Err(self.bad_return("a numeric scalar", other)),
        }
    }

    /// Call an export that only populates a scratch region.
    pub(crate) fn call_void(&self, store: &mut Store<HostState>, args: &[f64]) -> Result<(), WasmError> {
        self.invoke(store, args).map(|_| ())
    }

    /// Call an accessor export and return the offset it yields.
    pub(crate) fn call_offset(&self, store: &mut Store<HostState>) -> Result<u32, WasmError> {
        match self.invoke(store, &[])? {
            Some(Val::I32(ptr)) => Ok(ptr as u32),
            Some(Val::I64(ptr)) => u32::try_from(ptr)
                .map_err(|_| self.bad_return("a 32-bit offset", Some(Val::I64(ptr)))),
            other => Err(self.bad_return("an i32 offset", other)),
        }
    }

    fn unsupported(&self, ty: &ValType) -> WasmError {
        WasmError::ExportSignature {
            name: self.name.symbol().to_string(),
            expected: "numeric params and results".to_string(),
            actual: format!("{}", ty),
        }
    }

    fn bad_return(&self, expected: &str, got: Option<Val>) -> WasmError {
        WasmError::InvalidReturnType {
            expected: format!("{} from {}, got {:?}", expected, self.name, got),
        }
    }
}

/// Convert a host `f64` into the declared wasm value type.
fn coerce(value: f64, ty: &ValType) -> Option<Val> {
    match ty {
        ValType::F64 => Some(Val::F64(value.to_bits())),
        ValType::F32 => Some(Val::F32((value as f32).to_bits())),
        ValType::I32 => Some(Val::I32(value as i64 as i32)),
        ValType::I64 => Some(Val::I64(value as i64)),
        _ => None,
    }
}

/// Translate a wasmtime call error, recognizing `proc_exit` and bridge calls.
pub(crate) fn trap_error(err: wasmtime::Error) -> WasmError {
    if let Some(GuestExit(code)) = err.downcast_ref::<GuestExit>() {
        return WasmError::Exit(*code);
    }
    match err.downcast_ref::<UnavailableImport>() {
        Some(call) => WasmError::Trap(call.to_string()),
        None => WasmError::Trap(err.to_string()),
    }
}

/// Exports and memory captured after startup.
#[derive(Debug)]
pub struct ExportTable {
    memory: Memory,
    funcs: HashMap<ExportName, ScalarFunc>,
}

impl ExportTable {
    /// Capture every required export plus any optional ones present.
    pub fn capture(instance: &Instance, store: &mut Store<HostState>) -> Result<Self, WasmError> {
        let memory = instance
            .get_memory(&mut *store, MEMORY_EXPORT)
            .ok_or_else(|| WasmError::MissingExport(MEMORY_EXPORT.to_string()))?;

        let mut funcs = HashMap::new();
        for name in ExportName::REQUIRED {
            let func = ScalarFunc::capture(name, instance, store)?.ok_or_else(|| {
                error!(export = name.symbol(), "required export missing");
                WasmError::MissingExport(name.symbol().to_string())
            })?;
            funcs.insert(name, func);
        }
        for name in ExportName::OPTIONAL {
            if let Some(func) = ScalarFunc::capture(name, instance, store)? {
                funcs.insert(name, func);
            }
        }

        debug!(exports = funcs.len(), "captured export table");
        Ok(Self { memory, funcs })
    }

    pub fn memory(&self) -> Memory {
        self.memory
    }

    pub fn contains(&self, name: ExportName) -> bool {
        self.funcs.contains_key(&name)
    }

    pub(crate) fn func(&self, name: ExportName) -> Result<&ScalarFunc, WasmError> {
        self.funcs
            .get(&name)
            .ok_or_else(|| WasmError::MissingExport(name.symbol().to_string()))
    }
}
