//! Small capability traits shared by connections and devices.

/// Anything with a mutable display name.
///
/// The robot assigns a generated name (`"Connection1234"`, `"Device42"`)
/// to components that come in with an empty one, so `set_name` is called
/// at most once, before the component is shared.
pub trait Named {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
}

/// Pin-based drivers expose the pin they are wired to.
pub trait Pinner {
    fn pin(&self) -> &str;
}

/// Last path segment of `T`'s type name, without generic arguments.
///
/// `botkit_hal::sim::SimDevice` becomes `SimDevice`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
