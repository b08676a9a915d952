use std::borrow::Cow;

/// Common span attribute names.
pub struct SpanAttribute;

impl SpanAttribute {
    pub const TASK_ID: &'static str = "task.id";
    pub const TASK_USER_FILTER: &'static str = "task.user_filter";
    pub const ALLOCATION_ID: &'static str = "allocation.id";
    pub const ALLOCATION_COUNT: &'static str = "allocation.count";
    pub const CONTAINER_ID: &'static str = "container.id";
    pub const CONTAINER_STATE: &'static str = "container.state";
    pub const CONTAINER_FAILURE: &'static str = "container.failure";
    pub const EXCEPTION_MESSAGE: &'static str = "exception.message";
}

/// A trait for associating an object with a span.
/// The extracted information from the associated object
/// can be used for span names and properties.
pub trait SpanAssociation {
    /// The name of the object associated with the span.
    fn name(&self) -> Cow<'static, str>;

    /// The properties of the object associated with the span.
    fn properties(&self) -> impl IntoIterator<Item = (Cow<'static, str>, Cow<'static, str>)>;
}
