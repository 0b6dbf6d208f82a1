/// Emits the `__collect_tests` function a crate's test `main` calls.
/// Callers define `test_type!()` to name the test type they collect.
#[doc(hidden)]
#[macro_export]
macro_rules! __test_collector {
    ($builder:ident => $($body:tt)*) => {
        #[cfg(test)]
        pub(crate) fn __collect_tests
            ($builder: &mut $crate::TestDriverBuilder<test_type!()>)
        {
            $($body)*
        }
    }
}

/// Declares the tests of the enclosing module, in order. Entries are
/// function names, wrapped in parentheses when they carry attributes:
///
/// ```ignore
/// declare_tests![
///     passes,
///     (#[should_err] panics),
///     (#[xfail] #[ignore] flaky),
/// ];
/// ```
#[macro_export]
macro_rules! declare_tests {
    (@add $builder:ident, ($(#[$attr:ident])* $fn:ident)) => {
        $builder.add_test($crate::TestAttrs::new()
            $(.$attr())*
            .build_test(
                concat!(module_path!(), "::", stringify!($fn)).to_owned(),
                $fn as _,
            ));
    };
    (@add $builder:ident, $fn:ident) => {
        $crate::declare_tests!(@add $builder, ($fn));
    };
    ($($entry:tt),*$(,)?) => {
        $crate::__test_collector! { builder =>
            $($crate::declare_tests!(@add builder, $entry);)*
        }
    };
}

/// Chains the collectors of child modules, e.g.
/// `collect_tests![tests, parser::tests]`.
#[macro_export]
macro_rules! collect_tests {
    ($($($seg:ident)::+),*$(,)?) => {
        $crate::__test_collector! { builder =>
            $($($seg::)+__collect_tests(builder);)*
        }
    }
}
