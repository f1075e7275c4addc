#![cfg(feature = "remote")]

extern crate anyhow;

use bert_explorer::resources::{
    LocalResource, MultilingualBertResources, RemoteResource, ResourceProvider,
};
use std::path::PathBuf;

#[test]
fn local_resource_path() -> anyhow::Result<()> {
    //    Given
    let resource = LocalResource {
        local_path: PathBuf::from("models/config.json"),
    };

    //    Then
    assert_eq!(resource.get_local_path()?, PathBuf::from("models/config.json"));
    Ok(())
}

#[test]
fn pretrained_resources_share_a_cache_root() {
    let resources = [
        MultilingualBertResources::MODEL,
        MultilingualBertResources::CONFIG,
        MultilingualBertResources::VOCAB,
    ];
    for (cache_subdir, url) in resources {
        assert!(cache_subdir.starts_with("bert-base-multilingual-uncased/"));
        assert!(url.starts_with("https://huggingface.co/bert-base-multilingual-uncased/"));
    }
}

#[test]
#[cfg_attr(not(feature = "all-tests"), ignore)]
fn download_multilingual_config() -> anyhow::Result<()> {
    let resource = RemoteResource::from_pretrained(MultilingualBertResources::CONFIG);
    let path = resource.get_local_path()?;
    assert!(path.is_file());
    Ok(())
}
