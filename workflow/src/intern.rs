use internment::Intern;

/// Interned name of a workflow node or checkpoint. Equality is pointer identity.
pub type NodeName = Intern<str>;

/// Interned name of a resource declared through insert/write/read access.
pub type ResourceName = Intern<str>;

pub fn intern(name: &str) -> Intern<str> {
	Intern::from_ref(name)
}
