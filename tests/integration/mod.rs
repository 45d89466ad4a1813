mod minified_bundle;
