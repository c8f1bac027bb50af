use formrules::path::Segment;
use formrules::DataPath;

#[test]
fn root_renders_as_slash() {
    assert_eq!(DataPath::root().to_string(), "/");
    assert!(DataPath::parse("/").is_root());
}

#[test]
fn digit_keys_become_indices() {
    let path = DataPath::parse("/interfaces/1/dns");
    assert_eq!(
        path.segments(),
        &[
            Segment::Field("interfaces".to_string()),
            Segment::Index(1),
            Segment::Field("dns".to_string()),
        ]
    );
    assert_eq!(path.to_string(), "/interfaces/1/dns");
}

#[test]
fn bare_reference_is_a_sibling() {
    let path = DataPath::parse("/host/name");
    assert_eq!(path.resolve_reference("type").to_string(), "/host/type");
}

#[test]
fn parent_reference_climbs_one_object_level() {
    let path = DataPath::parse("/host/name");
    assert_eq!(path.resolve_reference("../type").to_string(), "/type");
}

#[test]
fn parent_reference_skips_element_index() {
    let path = DataPath::parse("/list/3/y");
    assert_eq!(path.resolve_reference("x").to_string(), "/list/3/x");
    assert_eq!(path.resolve_reference("../x").to_string(), "/x");
}

#[test]
fn nested_reference_descends() {
    let path = DataPath::parse("/a");
    assert_eq!(path.resolve_reference("b/c").to_string(), "/b/c");
}

#[test]
fn container_reference_is_a_child() {
    let path = DataPath::parse("/hosts/0");
    assert_eq!(path.resolve_from_container("host").to_string(), "/hosts/0/host");
    assert_eq!(path.resolve_from_container("../mode").to_string(), "/mode");
}

#[test]
fn climbing_past_root_stops_at_root() {
    let path = DataPath::parse("/a");
    assert_eq!(path.resolve_reference("../../b").to_string(), "/b");
}
