pub mod graph;
pub mod normalize;

pub use graph::{
    ensure_contact_identifier, ensure_me_person, ensure_person_contact_link,
    ensure_person_for_contact, get_or_create_contact, me_person, merge_persons,
    persons_for_contact,
};
pub use normalize::{is_meaningful_name, normalize_identifier};
